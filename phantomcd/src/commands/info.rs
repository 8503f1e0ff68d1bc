//! READ DISC INFORMATION, READ TRACK INFORMATION, READ DVD STRUCTURE,
//! REPORT KEY.

use disc_lib::{Lba, SectorType};

use crate::commands::{CmdIo, cdb_u16, cdb_u32};
use crate::device::DeviceState;
use crate::device::features::Profile;
use crate::sense::CommandError;

pub fn read_disc_information(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let data_type = cdb[1] & 0x07;
    let allocation_length = cdb_u16(cdb, 7) as usize;

    let disc = state.disc_loaded()?;

    // Only the standard disc-information block.
    if data_type != 0x00 {
        return Err(CommandError::InvalidFieldInCdb);
    }

    let sessions = disc.sessions().len() as u16;
    let last_session = disc
        .session_by_index(-1)
        .ok_or(CommandError::MediumNotPresent)?;
    let first_in_last = last_session
        .track_by_index(0)
        .map(|t| t.number())
        .unwrap_or(1) as u16;
    let last_in_last = last_session
        .track_by_index(-1)
        .map(|t| t.number())
        .unwrap_or(1) as u16;
    let disc_type = disc
        .session_by_index(0)
        .map(|s| s.session_type.format_code())
        .unwrap_or(0);
    let leadin = last_session.leadin_start();

    io.flush();
    let data = io.scratch();
    data.resize(34, 0);
    data[0..2].copy_from_slice(&32u16.to_be_bytes());
    data[2] = 0x0E; // disc complete, last session complete
    data[3] = 0x01; // first track on disc
    data[4] = sessions as u8;
    data[5] = first_in_last as u8;
    data[6] = last_in_last as u8;
    data[8] = disc_type;
    data[9] = (sessions >> 8) as u8;
    data[10] = (first_in_last >> 8) as u8;
    data[11] = (last_in_last >> 8) as u8;

    let msf = leadin.to_msf(true);
    data[16..20].copy_from_slice(&[0, msf.m, msf.s, msf.f]);
    // Not a writer: no last possible lead-out.
    data[20..24].fill(0xFF);

    io.write_buffer(allocation_length);
    Ok(())
}

pub fn read_track_information(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let address_type = cdb[1] & 0x03;
    let number = cdb_u32(cdb, 2);
    let allocation_length = cdb_u16(cdb, 7) as usize;

    let disc = state.disc_loaded()?;

    let found = match address_type {
        0x00 => disc.track_by_address(Lba::from(number as i32)),
        0x01 => match number {
            // Lead-in and the invisible track are not addressable here.
            0x00 | 0xFF => return Err(CommandError::InvalidFieldInCdb),
            _ => disc.track_by_number(number as u8),
        },
        0x02 => disc
            .session_by_number(number as u8)
            .and_then(|s| s.track_by_index(0).map(|t| (s, t))),
        _ => return Err(CommandError::InvalidFieldInCdb),
    };

    let Some((session, track)) = found else {
        return Err(CommandError::InvalidFieldInCdb);
    };

    let data_mode = match track.kind() {
        SectorType::Audio | SectorType::Mode1 => 0x01,
        kind if kind.is_mode2() => 0x02,
        _ => 0x0F,
    };

    io.flush();
    let data = io.scratch();
    data.resize(36, 0);
    data[0..2].copy_from_slice(&34u16.to_be_bytes());
    data[2] = track.number();
    data[3] = session.number();
    data[5] = track.ctl();
    data[6] = data_mode;
    data[8..12].copy_from_slice(&(track.start_sector().raw() as u32).to_be_bytes());
    data[24..28].copy_from_slice(&(track.length() as u32).to_be_bytes());

    io.write_buffer(allocation_length);
    Ok(())
}

pub fn read_dvd_structure(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let layer = cdb[6];
    let format = cdb[7];
    let allocation_length = cdb_u16(cdb, 8) as usize;

    let disc = state.disc_loaded()?;

    if state.features.current_profile != Profile::DvdRom {
        return Err(CommandError::CannotReadMediumIncompatibleFormat);
    }

    let structure = disc
        .structure(layer, format)
        .ok_or(CommandError::InvalidFieldInCdb)?;

    io.flush();
    let data = io.scratch();
    data.resize(4, 0);
    data.extend_from_slice(structure);
    let total = data.len() as u16;
    data[0..2].copy_from_slice(&(total - 2).to_be_bytes());

    io.write_buffer(allocation_length);
    Ok(())
}

pub fn report_key(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let key_format = cdb[10] & 0x3F;
    let allocation_length = cdb_u16(cdb, 8) as usize;

    if key_format != 0x08 {
        // Key exchange is not implemented; on non-DVD media the whole
        // command class is inapplicable.
        if state.features.current_profile != Profile::DvdRom {
            return Err(CommandError::CannotReadMediumIncompatibleFormat);
        }
        return Err(CommandError::InvalidFieldInCdb);
    }

    // RPC state: region-free drive, 4 vendor resets, 5 user changes left.
    io.flush();
    let data = io.scratch();
    data.resize(8, 0);
    data[0..2].copy_from_slice(&6u16.to_be_bytes());
    data[4] = (0x00 << 6) | (4 << 3) | 5;
    data[5] = 0xFF; // region mask
    data[6] = 0x01; // RPC scheme

    io.write_buffer(allocation_length);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commands::execute;
    use crate::device::kernel_io::{STATUS_CHECK_CONDITION, STATUS_GOOD};
    use crate::device::test_support;

    #[test]
    fn disc_information_basics() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x51, 0, 0, 0, 0, 0, 0, 0x00, 0x40, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);

        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data[2], 0x0E);
        assert_eq!(response.data[3], 0x01);
        assert_eq!(response.data[4], 1); // sessions
        assert_eq!(response.data[5], 1);
        assert_eq!(response.data[6], 1);
        assert_eq!(response.data[8], 0x00); // CD-DA disc type
        assert_eq!(&response.data[20..24], &[0xFF; 4]);
    }

    #[test]
    fn disc_information_other_types_rejected() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x51, 0x01, 0, 0, 0, 0, 0, 0x00, 0x40, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x24);
    }

    #[test]
    fn track_information_by_number() {
        let mut state = test_support::loaded_state(test_support::data_disc());
        let cdb = [0x52, 0x01, 0, 0, 0, 1, 0, 0x00, 0x40, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);

        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data[2], 1); // track
        assert_eq!(response.data[3], 1); // session
        assert_eq!(response.data[5], 0x04); // data CTL
        assert_eq!(response.data[6], 0x01); // data mode 1
        assert_eq!(&response.data[8..12], &0u32.to_be_bytes());
        assert_eq!(&response.data[24..28], &166u32.to_be_bytes());
    }

    #[test]
    fn track_information_leadin_rejected() {
        let mut state = test_support::loaded_state(test_support::data_disc());
        for number in [0x00u8, 0xFF] {
            let cdb = [0x52, 0x01, 0, 0, 0, number, 0, 0x00, 0x40, 0, 0, 0];
            let response = execute(&mut state, &cdb, &[], 4096);
            assert_eq!(response.status, STATUS_CHECK_CONDITION);
        }
    }

    #[test]
    fn track_information_by_session() {
        let mut state = test_support::loaded_state(test_support::data_disc());
        let cdb = [0x52, 0x02, 0, 0, 0, 1, 0, 0x00, 0x40, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data[2], 1);
    }

    #[test]
    fn dvd_structure_requires_dvd_profile() {
        let mut state = test_support::loaded_state(test_support::data_disc());
        let cdb = [0xAD, 0, 0, 0, 0, 0, 0, 0x00, 0x10, 0x00, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x30);
        assert_eq!(response.data[13], 0x02);
    }

    #[test]
    fn dvd_structure_served_from_disc() {
        let mut disc = test_support::data_disc();
        disc.set_medium_type(disc_lib::MediumType::Dvd);
        disc.set_structure(0, 0x00, vec![0xDE, 0xAD]);
        let mut state = test_support::loaded_state(disc);

        let cdb = [0xAD, 0, 0, 0, 0, 0, 0, 0x00, 0x10, 0x00, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(&response.data[4..6], &[0xDE, 0xAD]);

        // Absent structures are an invalid field.
        let cdb = [0xAD, 0, 0, 0, 0, 0, 1, 0x00, 0x10, 0x00, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data[12], 0x24);
    }

    #[test]
    fn report_key_rpc_state() {
        let mut state = test_support::state();
        let cdb = [0xA4, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x08, 0x08, 0];
        let response = execute(&mut state, &cdb, &[], 4096);

        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data[4], 0x25); // 4 vendor resets, 5 user changes
        assert_eq!(response.data[5], 0xFF);
        assert_eq!(response.data[6], 0x01);
    }

    #[test]
    fn report_key_other_formats() {
        let mut state = test_support::state();
        let cdb = [0xA4, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x08, 0x00, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data[12], 0x30); // incompatible medium on non-DVD

        state.features.set_profile(Profile::DvdRom);
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data[12], 0x24);
    }
}
