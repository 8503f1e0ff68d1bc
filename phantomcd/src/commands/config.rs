//! GET CONFIGURATION and GET EVENT/STATUS NOTIFICATION.

use crate::commands::{CmdIo, cdb_u16};
use crate::device::{DeviceState, MediaEvent};
use crate::sense::CommandError;

pub fn get_configuration(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let rt = cdb[1] & 0x03;
    let starting_feature = cdb_u16(cdb, 2);
    let allocation_length = cdb_u16(cdb, 7) as usize;

    io.flush();
    let data = io.scratch();
    data.resize(8, 0);

    // Copy a feature when:
    //  a) RT is 0x00 and its code >= SFN
    //  b) RT is 0x01, its code >= SFN and it is current
    //  c) RT is 0x02 and its code == SFN (one-shot)
    for feature in state.features.iter() {
        if feature.code < starting_feature {
            continue;
        }
        let wanted = match rt {
            0x00 => true,
            0x01 => feature.current,
            0x02 => feature.code == starting_feature,
            _ => false,
        };
        if wanted {
            data.extend_from_slice(&feature.serialize());
            if rt == 0x02 {
                break;
            }
        }
    }

    let total = data.len() as u32;
    data[0..4].copy_from_slice(&(total - 4).to_be_bytes());
    data[6..8].copy_from_slice(&u16::from(state.features.current_profile).to_be_bytes());

    io.write_buffer(allocation_length);
    Ok(())
}

pub fn get_event_status_notification(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let immed = cdb[1] & 0x01 != 0;
    let request = cdb[4];
    let allocation_length = cdb_u16(cdb, 7) as usize;

    // Only the polled form; the asynchronous form is not supported.
    if !immed {
        return Err(CommandError::InvalidFieldInCdb);
    }

    const MEDIA_CLASS: u8 = 1 << 4;

    let media_event = state.media_event;
    let loaded = state.loaded;

    io.flush();
    let data = io.scratch();
    data.resize(4, 0);
    data[3] = MEDIA_CLASS; // supported event classes

    if request & MEDIA_CLASS != 0 {
        data[2] = 0x04; // media notification class
        data.push(u8::from(media_event)); // latched event
        data.push(if loaded { 0x02 } else { 0x00 }); // media present
        data.push(0); // start slot
        data.push(0); // end slot

        // Reading the event clears the latch.
        state.media_event = MediaEvent::NoChange;
    } else {
        data[2] = 0x80; // NEA: nothing to report for the requested classes
    }

    let total = data.len() as u16;
    data[0..2].copy_from_slice(&(total - 2).to_be_bytes());

    io.write_buffer(allocation_length);
    Ok(())
}
