//! MODE SENSE, MODE SELECT and SET CD SPEED.

use crate::commands::{CmdIo, cdb_u16, opcode};
use crate::device::DeviceState;
use crate::device::mode_pages::PageFlavor;
use crate::sense::CommandError;

pub fn mode_sense(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let pc = cdb[2] >> 6;
    let page_code = cdb[2] & 0x3F;

    let (transfer_length, header_len) = if cdb[0] == opcode::MODE_SENSE_6 {
        (cdb[4] as usize, 4)
    } else {
        (cdb_u16(cdb, 7) as usize, 8)
    };

    let flavor = match pc {
        0x00 => PageFlavor::Current,
        0x01 => PageFlavor::Mask,
        0x02 => PageFlavor::Default,
        _ => return Err(CommandError::SavingParametersNotSupported),
    };

    io.flush();
    let data = io.scratch();
    data.resize(header_len, 0);

    if page_code == 0x3F {
        for page in state.mode_pages.iter() {
            data.extend_from_slice(page.get(flavor));
        }
    } else {
        let page = state
            .mode_pages
            .get(page_code, flavor)
            .ok_or(CommandError::InvalidFieldInCdb)?;
        data.extend_from_slice(page);
    }

    // Mode data length, minus the length field itself. No block descriptors.
    let total = data.len();
    if header_len == 4 {
        data[0] = (total - 2) as u8;
    } else {
        data[0..2].copy_from_slice(&((total - 2) as u16).to_be_bytes());
    }

    io.write_buffer(transfer_length);
    Ok(())
}

pub fn mode_select(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let (transfer_length, header_len) = if cdb[0] == opcode::MODE_SELECT_6 {
        (cdb[4] as usize, 4)
    } else {
        (cdb_u16(cdb, 7) as usize, 8)
    };

    io.read_buffer(transfer_length);
    let data = io.scratch().clone();

    if data.len() < header_len {
        return Err(CommandError::InvalidFieldInParameterList);
    }

    // ATAPI devices take no block descriptors.
    let blockdesc_len = if header_len == 4 {
        data[3] as usize
    } else {
        u16::from_be_bytes([data[6], data[7]]) as usize
    };
    if blockdesc_len != 0 {
        return Err(CommandError::InvalidFieldInParameterList);
    }

    let page = &data[header_len..];
    if !page.is_empty() {
        state.mode_pages.modify(page)?;
    }

    Ok(())
}

pub fn set_cd_speed(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    let read_speed = cdb_u16(cdb, 2);

    if let Some(page) = state.mode_pages.current_mut(0x2A) {
        if read_speed == 0xFFFF {
            // Max speed requested.
            let max = [page[8], page[9]];
            page[14..16].copy_from_slice(&max);
        } else {
            page[14..16].copy_from_slice(&read_speed.to_be_bytes());
        }
    }

    Ok(())
}
