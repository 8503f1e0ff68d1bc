//! READ (10/12), READ CD / READ CD MSF, READ CAPACITY.

use bitflags::bitflags;
use disc_lib::sector::Sector;
use disc_lib::{DiscError, Lba, Msf, SectorType};

use crate::commands::{CmdIo, cdb_u16, cdb_u24, cdb_u32, opcode};
use crate::device::DeviceState;
use crate::device::features::Profile;
use crate::device::mode_pages::PageFlavor;
use crate::sense::CommandError;

bitflags! {
    /// READ CD main channel selection byte (CDB byte 9).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MainChannelFlags: u8 {
        const SYNC = 1 << 7;
        const SUBHEADER = 1 << 6;
        const HEADER = 1 << 5;
        const USER_DATA = 1 << 4;
        const EDC_ECC = 1 << 3;
    }
}

fn map_read_error(error: DiscError, address: i32) -> CommandError {
    match error {
        DiscError::Read { .. } => CommandError::UnrecoveredReadError { address },
        _ => CommandError::IllegalModeForThisTrack {
            ili: false,
            address,
        },
    }
}

/// Bad-sector emulation: a bad sector is stored with an EDC that no longer
/// matches its data. With corrections enabled (DCR clear) such a sector is
/// an unrecoverable read error; checked for Mode 1 and Mode 2 Form 1 only.
fn check_bad_sector(
    sector: &Sector,
    enabled: bool,
    dcr: bool,
    address: i32,
) -> Result<(), CommandError> {
    if !enabled || dcr {
        return Ok(());
    }
    if matches!(sector.kind(), SectorType::Mode1 | SectorType::Mode2Form1)
        && !sector.verify_edc()
    {
        return Err(CommandError::UnrecoveredReadError { address });
    }
    Ok(())
}

fn dcr_bit(state: &DeviceState) -> bool {
    state
        .mode_pages
        .get(0x01, PageFlavor::Current)
        .is_some_and(|page| page[2] & 0x01 != 0)
}

pub fn read(state: &mut DeviceState, cdb: &[u8; 12], io: &mut CmdIo) -> Result<(), CommandError> {
    // Start address is signed; lead-in reads are legal.
    let start_address = cdb_u32(cdb, 2) as i32;
    let num_sectors = if cdb[0] == opcode::READ_10 {
        cdb_u16(cdb, 7) as i32
    } else {
        cdb_u32(cdb, 6) as i32
    };

    state.disc_loaded()?;
    let dcr = dcr_bit(state);
    let bad_sector = state.bad_sector_emulation;

    state.delay_begin(Lba::from(start_address), num_sectors);

    let DeviceState {
        disc,
        current_address,
        ..
    } = state;
    let disc = disc.as_ref().ok_or(CommandError::MediumNotPresent)?;

    for address in start_address..start_address + num_sectors {
        io.flush();

        let sector = disc
            .get_sector(Lba::from(address))
            .map_err(|e| map_read_error(e, address))?;

        check_bad_sector(&sector, bad_sector, dcr, address)?;

        // READ serves only sectors with 2048 bytes of user data.
        let data = sector.data();
        if data.len() != 2048 {
            return Err(CommandError::IllegalModeForThisTrack {
                ili: true,
                address,
            });
        }

        io.scratch().extend_from_slice(data);
        *current_address = Lba::from(address);
        let committed = io.scratch().len();
        io.write_buffer(committed);
    }

    state.delay_finalize();
    Ok(())
}

/// Append the selected channels of one sector in canonical order:
/// sync | header | subheader | data | EDC/ECC | C2 | subchannel.
fn append_sector_data(sector: &Sector, mcsb: u8, subchannel_mode: u8, out: &mut Vec<u8>) {
    if mcsb != 0 {
        let flags = MainChannelFlags::from_bits_truncate(mcsb);

        if flags.contains(MainChannelFlags::SYNC) {
            out.extend_from_slice(sector.sync());
        }
        if flags.contains(MainChannelFlags::HEADER) {
            out.extend_from_slice(sector.header());
        }
        if flags.contains(MainChannelFlags::SUBHEADER) {
            out.extend_from_slice(sector.subheader());
        }
        if flags.contains(MainChannelFlags::USER_DATA) {
            out.extend_from_slice(sector.data());
        }
        if flags.contains(MainChannelFlags::EDC_ECC) {
            out.extend_from_slice(sector.edc_ecc());
        }

        // C2 error bits: this device never produces C2 errors.
        match (mcsb >> 1) & 0x03 {
            0x01 => out.extend_from_slice(&[0u8; 294]),
            0x02 => out.extend_from_slice(&[0u8; 296]),
            _ => {}
        }
    }

    match subchannel_mode {
        0x01 => out.extend_from_slice(sector.subchannel_pw()),
        0x02 => out.extend_from_slice(&sector.subchannel_q()),
        _ => {}
    }
}

fn expected_sector_type(selector: u8) -> Result<Option<SectorType>, CommandError> {
    Ok(match selector {
        0 => None,
        1 => Some(SectorType::Audio),
        2 => Some(SectorType::Mode1),
        3 => Some(SectorType::Mode2Formless),
        4 => Some(SectorType::Mode2Form1),
        5 => Some(SectorType::Mode2Form2),
        _ => return Err(CommandError::InvalidFieldInCdb),
    })
}

pub fn read_cd(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let (start_address, num_sectors) = if cdb[0] == opcode::READ_CD {
        (cdb_u32(cdb, 2) as i32, cdb_u24(cdb, 6) as i32)
    } else {
        // READ CD MSF: an absolute range, end exclusive.
        let start = Msf::new(cdb[3], cdb[4], cdb[5]).to_lba(true).raw();
        let end = Msf::new(cdb[6], cdb[7], cdb[8]).to_lba(true).raw();
        (start, end - start)
    };

    let expected = expected_sector_type((cdb[1] >> 2) & 0x07)?;
    let mcsb = cdb[9];
    let subchannel_mode = cdb[10] & 0x07;

    state.disc_loaded()?;

    // CD sector addressing makes no sense against a DVD.
    if state.features.current_profile == Profile::DvdRom {
        return Err(CommandError::InvalidFieldInCdb);
    }

    // R-W subchannel reading is not supported; probes with a zero transfer
    // length rely on this being rejected up front.
    if subchannel_mode == 0x04 {
        return Err(CommandError::InvalidFieldInCdb);
    }

    let dcr = dcr_bit(state);
    let bad_sector = state.bad_sector_emulation;

    state.delay_begin(Lba::from(start_address), num_sectors);

    let DeviceState {
        disc,
        current_address,
        ..
    } = state;
    let disc = disc.as_ref().ok_or(CommandError::MediumNotPresent)?;

    let mut prev_is_audio: Option<bool> = None;

    for address in start_address..start_address + num_sectors {
        io.flush();

        let sector = disc
            .get_sector(Lba::from(address))
            .map_err(|e| map_read_error(e, address))?;

        // With an expected type, every sector of the run must match. With
        // none, the transfer terminates at a CD-ROM/CD-DA transition; data
        // mode constancy beyond that is not enforced, since Form 1 and
        // Form 2 legitimately alternate within one track.
        let is_audio = sector.kind() == SectorType::Audio;
        match expected {
            Some(expected) if sector.kind() != expected => {
                return Err(CommandError::IllegalModeForThisTrack {
                    ili: true,
                    address,
                });
            }
            None if prev_is_audio.is_some_and(|prev| prev != is_audio) => {
                return Err(CommandError::IllegalModeForThisTrack {
                    ili: false,
                    address,
                });
            }
            _ => {}
        }
        prev_is_audio = Some(is_audio);

        check_bad_sector(&sector, bad_sector, dcr, address)?;

        // NOTE: MCSB combinations are not validated for legality.
        append_sector_data(&sector, mcsb, subchannel_mode, io.scratch());
        *current_address = Lba::from(address);
        let committed = io.scratch().len();
        io.write_buffer(committed);
    }

    state.delay_finalize();
    Ok(())
}

pub fn read_capacity(
    state: &mut DeviceState,
    _cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;

    // Capacity: the sector before the last session's lead-out.
    let last_session = disc
        .session_by_index(-1)
        .ok_or(CommandError::MediumNotPresent)?;
    let last_sector = last_session.leadout_start().raw() - 1;

    io.flush();
    let data = io.scratch();
    data.extend_from_slice(&(last_sector as u32).to_be_bytes());
    data.extend_from_slice(&2048u32.to_be_bytes());
    io.write_buffer(8);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commands::execute;
    use crate::device::kernel_io::{STATUS_CHECK_CONDITION, STATUS_GOOD};
    use crate::device::test_support;

    #[test]
    fn read_without_medium_fails_not_ready() {
        let mut state = test_support::state();
        let cdb = [0x28, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[2], 0x02);
        assert_eq!(response.data[12], 0x3A);
        assert_eq!(response.data[13], 0x00);
    }

    #[test]
    fn read_10_returns_user_data() {
        let mut state = test_support::loaded_state(test_support::data_disc());
        // First two data sectors past the pregap (LBA 150).
        let cdb = [0x28, 0, 0, 0, 0, 150, 0, 0, 2, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 8192);

        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data.len(), 4096);
        assert!(response.data[..2048].iter().all(|&b| b == 0));
        assert!(response.data[2048..].iter().all(|&b| b == 1));
        assert_eq!(state.current_address.raw(), 151);
    }

    #[test]
    fn read_10_on_audio_track_fails() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x28, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x64);
        assert_eq!(response.data[2] & 0x20, 0x20); // ILI
    }

    #[test]
    fn read_past_layout_fails() {
        let mut state = test_support::loaded_state(test_support::data_disc());
        // Layout covers 0..166; the first sector outside fails.
        let cdb = [0x28, 0, 0, 0, 0, 166, 0, 0, 1, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x64);
    }

    #[test]
    fn read_cd_full_raw_audio() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        // Expected type CD-DA, 1 sector, full main channel.
        let cdb = [0xBE, 0x04, 0, 0, 0, 0, 0, 0, 1, 0xF8, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data.len(), 2352);
    }

    #[test]
    fn read_cd_expected_type_mismatch() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        // Expecting Mode 1 on an audio disc.
        let cdb = [0xBE, 0x08, 0, 0, 0, 0, 0, 0, 1, 0xF8, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x64);
    }

    #[test]
    fn read_cd_with_q_subchannel() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0xBE, 0, 0, 0, 0, 0, 0, 0, 1, 0x10, 0x02, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data.len(), 2352 + 16);
        // ADR 1, audio CTL 0.
        assert_eq!(response.data[2352], 0x01);
    }

    #[test]
    fn read_cd_rejects_rw_subchannel() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0xBE, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x04, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x24);
    }

    #[test]
    fn read_cd_rejected_on_dvd_profile() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        state.features.set_profile(Profile::DvdRom);
        let cdb = [0xBE, 0, 0, 0, 0, 0, 0, 0, 1, 0xF8, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x24);
    }

    #[test]
    fn read_capacity_reports_leadout() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        // 150-sector pregap + 2250 sectors - 1 = 2399.
        assert_eq!(
            u32::from_be_bytes(response.data[0..4].try_into().unwrap()),
            2399
        );
        assert_eq!(
            u32::from_be_bytes(response.data[4..8].try_into().unwrap()),
            2048
        );
    }

    #[test]
    fn read_cd_msf_range() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        // 00:02:00 to 00:02:02 = LBA 0..2.
        let cdb = [0xB9, 0, 0, 0, 2, 0, 0, 2, 2, 0xF8, 0, 0];
        let response = execute(&mut state, &cdb, &[], 8192);
        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data.len(), 2 * 2352);
    }
}
