//! READ TOC/PMA/ATIP.

use disc_lib::bcd::hex_to_bcd;
use disc_lib::{Lba, Track};

use crate::commands::{CmdIo, cdb_u16};
use crate::device::DeviceState;
use crate::device::features::Profile;
use crate::sense::CommandError;

/// Render an address as `[0, m, s, f]` or a big-endian LBA per the TIME bit.
fn address_field(lba: Lba, time: bool) -> [u8; 4] {
    if time {
        let msf = lba.to_msf(true);
        [0, msf.m, msf.s, msf.f]
    } else {
        (lba.raw() as u32).to_be_bytes()
    }
}

fn adr_ctl(track: &Track) -> u8 {
    (track.adr() << 4) | track.ctl()
}

/// Formatted TOC descriptor (8 bytes).
fn push_toc_descriptor(out: &mut Vec<u8>, adr_ctl: u8, number: u8, address: [u8; 4]) {
    out.push(0);
    out.push(adr_ctl);
    out.push(number);
    out.push(0);
    out.extend_from_slice(&address);
}

/// Raw TOC descriptor (11 bytes). MIN/SEC/FRAME and PMIN/PSEC/PFRAME carry
/// BCD where they hold timecodes; POINT-specific literals pass through.
#[allow(clippy::too_many_arguments)]
fn push_raw_descriptor(
    out: &mut Vec<u8>,
    session: u8,
    adr_ctl: u8,
    point: u8,
    msf: [u8; 3],
    zero: u8,
    pfield: [u8; 3],
) {
    out.push(session);
    out.push(adr_ctl);
    out.push(0); // TNO
    out.push(point);
    out.extend_from_slice(&msf);
    out.push(zero);
    out.extend_from_slice(&pfield);
}

fn bcd_msf(lba: Lba) -> [u8; 3] {
    let (m, s, f) = lba.to_msf(true).to_bcd();
    [m, s, f]
}

fn track_position(track: &Track) -> Lba {
    track.start_sector().offset(track.track_start())
}

fn formatted_toc(
    state: &DeviceState,
    number: u8,
    time: bool,
    data: &mut Vec<u8>,
) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;

    data.resize(4, 0);

    // "For multi-session discs, this command returns the TOC data for all
    // sessions"; track 0xAA requests only the lead-out of the last session.
    if number != 0xAA {
        let last_track = disc
            .track_by_index(-1)
            .map(|(_, t)| t.number())
            .unwrap_or(0);
        if number > last_track {
            return Err(CommandError::InvalidFieldInCdb);
        }

        for session in disc.sessions() {
            for track in session.tracks() {
                if track.number() < number {
                    continue;
                }
                push_toc_descriptor(
                    data,
                    adr_ctl(track),
                    track.number(),
                    address_field(track_position(track), time),
                );
            }
        }
    }

    let last_session = disc
        .session_by_index(-1)
        .ok_or(CommandError::MediumNotPresent)?;
    push_toc_descriptor(
        data,
        0x10,
        0xAA,
        address_field(last_session.leadout_start(), time),
    );

    let last_track = last_session
        .track_by_index(-1)
        .map(Track::number)
        .unwrap_or(0);

    let total = data.len() as u16;
    data[0..2].copy_from_slice(&(total - 2).to_be_bytes());
    data[2] = 0x01;
    data[3] = last_track;
    Ok(())
}

fn multisession_info(
    state: &DeviceState,
    time: bool,
    data: &mut Vec<u8>,
) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;
    let last_session = disc
        .session_by_index(-1)
        .ok_or(CommandError::MediumNotPresent)?;
    let first_track = last_session
        .track_by_index(0)
        .ok_or(CommandError::MediumNotPresent)?;

    data.resize(12, 0);
    data[0..2].copy_from_slice(&10u16.to_be_bytes());
    data[2] = 0x01;
    data[3] = last_session.number();
    data[5] = adr_ctl(first_track);
    data[6] = first_track.number();
    data[8..12].copy_from_slice(&address_field(track_position(first_track), time));
    Ok(())
}

fn raw_toc(state: &DeviceState, number: u8, data: &mut Vec<u8>) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;

    data.resize(4, 0);
    let num_sessions = disc.sessions().len();

    for session in disc.sessions() {
        if session.number() < number {
            continue;
        }

        let first = session.track_by_index(0);
        let last = session.track_by_index(-1);
        let (Some(first), Some(last)) = (first, last) else {
            continue;
        };

        // A0: first track number and session format.
        push_raw_descriptor(
            data,
            session.number(),
            adr_ctl(first),
            0xA0,
            [0; 3],
            0,
            [
                hex_to_bcd(first.number()),
                session.session_type.format_code(),
                0,
            ],
        );

        // A1: last track number.
        push_raw_descriptor(
            data,
            session.number(),
            adr_ctl(last),
            0xA1,
            [0; 3],
            0,
            [hex_to_bcd(last.number()), 0, 0],
        );

        // A2: lead-out start.
        push_raw_descriptor(
            data,
            session.number(),
            0x10,
            0xA2,
            [0; 3],
            0,
            bcd_msf(session.leadout_start()),
        );

        // One descriptor per track.
        for track in session.tracks() {
            push_raw_descriptor(
                data,
                session.number(),
                adr_ctl(track),
                hex_to_bcd(track.number()),
                [0; 3],
                0,
                bcd_msf(track_position(track)),
            );
        }

        // Multisession discs get B0 (next programmable area) and, for the
        // first session, C0 descriptors.
        if num_sessions > 1 {
            let msf = if (session.number() as usize) < num_sessions {
                bcd_msf(session.leadout_start().offset(session.leadout_length()))
            } else {
                [0xFF, 0xFF, 0xFF]
            };
            let mode5_count = if session.number() == 1 { 2 } else { 1 };
            // 80-minute blank capacity pattern.
            push_raw_descriptor(
                data,
                session.number(),
                0x50,
                0xB0,
                msf,
                mode5_count,
                [0x4F, 0x3B, 0x47],
            );

            if session.number() == 1 {
                push_raw_descriptor(
                    data,
                    session.number(),
                    0x50,
                    0xC0,
                    [0; 3],
                    0,
                    [0x95, 0x00, 0x00],
                );
            }
        }
    }

    let last_session = disc
        .session_by_index(-1)
        .ok_or(CommandError::MediumNotPresent)?;
    let total = data.len() as u16;
    data[0..2].copy_from_slice(&(total - 2).to_be_bytes());
    data[2] = 0x01;
    data[3] = last_session.number();
    Ok(())
}

fn cdtext(state: &DeviceState, data: &mut Vec<u8>) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;

    data.resize(4, 0);
    if let Some(session) = disc.session_by_index(0) {
        data.extend_from_slice(&session.cdtext_data());
    }

    let total = data.len() as u16;
    data[0..2].copy_from_slice(&(total - 2).to_be_bytes());
    Ok(())
}

pub fn read_toc_pma_atip(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let time = cdb[1] & 0x02 != 0;
    let mut format = cdb[2] & 0x0F;
    let number = cdb[6];
    let allocation_length = cdb_u16(cdb, 7) as usize;
    let control = cdb[9];

    state.disc_loaded()?;

    // INF-8020 hosts encode the format in the control byte; play along.
    if format == 0x00 {
        match control {
            0x40 => format = 0x01,
            0x80 => format = 0x02,
            _ => {}
        }
    }

    // Only the TOC forms are defined for DVD media.
    if state.features.current_profile == Profile::DvdRom && format > 0x01 {
        return Err(CommandError::InvalidFieldInCdb);
    }

    io.flush();
    let mut data = Vec::new();

    match format {
        0x00 => formatted_toc(state, number, time, &mut data)?,
        0x01 => multisession_info(state, time, &mut data)?,
        0x02 => raw_toc(state, number, &mut data)?,
        0x04 => {
            // ATIP: header only; no recordable medium information.
            data.resize(4, 0);
            data[0..2].copy_from_slice(&2u16.to_be_bytes());
        }
        0x05 => cdtext(state, &mut data)?,
        _ => return Err(CommandError::InvalidFieldInCdb),
    }

    io.scratch().extend_from_slice(&data);
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
    fn formatted_toc_lba() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x43, 0, 0, 0, 0, 0, 0, 0x04, 0x00, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);

        assert_eq!(response.status, STATUS_GOOD);
        // Header + track 1 + lead-out.
        assert_eq!(response.data.len(), 4 + 8 + 8);
        assert_eq!(response.data[2], 1); // first track
        assert_eq!(response.data[3], 1); // last track
        assert_eq!(response.data[5], 0x10); // ADR 1, audio
        assert_eq!(response.data[6], 1);
        // Track 1 index 1 at LBA 150.
        assert_eq!(&response.data[8..12], &150u32.to_be_bytes());
        // Lead-out at 2400.
        assert_eq!(response.data[14], 0xAA);
        assert_eq!(&response.data[16..20], &2400u32.to_be_bytes());
    }

    #[test]
    fn formatted_toc_msf() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x43, 0x02, 0, 0, 0, 0, 0, 0x04, 0x00, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        // Track 1 at 00:04:00 (150 + 150 lead-in bias).
        assert_eq!(&response.data[8..12], &[0, 0, 4, 0]);
    }

    #[test]
    fn inf8020_control_byte_mapping() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        // Format 0 with control 0x40 behaves as format 1.
        let cdb = [0x43, 0, 0, 0, 0, 0, 0, 0x04, 0x00, 0x40, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data.len(), 12);
        assert_eq!(response.data[3], 1); // last session
    }

    #[test]
    fn starting_track_beyond_last_rejected() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x43, 0, 0, 0, 0, 0, 9, 0x04, 0x00, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
    }

    #[test]
    fn raw_toc_descriptors() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x43, 0, 0x02, 0, 0, 0, 0, 0x04, 0x00, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);

        assert_eq!(response.status, STATUS_GOOD);
        // Header + A0 + A1 + A2 + one track descriptor.
        assert_eq!(response.data.len(), 4 + 4 * 11);

        let a0 = &response.data[4..15];
        assert_eq!(a0[3], 0xA0);
        assert_eq!(a0[8], 0x01); // first track, BCD

        let a2 = &response.data[26..37];
        assert_eq!(a2[3], 0xA2);
        // Lead-out 2400 => 00:34:00, BCD.
        assert_eq!(&a2[8..11], &[0x00, 0x34, 0x00]);

        let t1 = &response.data[37..48];
        assert_eq!(t1[3], 0x01);
        // Track 1 index 1 at LBA 150 => 00:04:00.
        assert_eq!(&t1[8..11], &[0x00, 0x04, 0x00]);
    }

    #[test]
    fn atip_header_only() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x43, 0, 0x04, 0, 0, 0, 0, 0x04, 0x00, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data, vec![0, 2, 0, 0]);
    }

    #[test]
    fn unknown_format_rejected() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x43, 0, 0x07, 0, 0, 0, 0, 0x04, 0x00, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x24);
    }
}
