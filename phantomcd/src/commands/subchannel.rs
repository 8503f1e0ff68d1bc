//! READ SUBCHANNEL.

use disc_lib::bcd::bcd_to_hex;
use disc_lib::subchannel::{ADR_MODE1_POSITION, ADR_MODE2_MCN, ADR_MODE3_ISRC, decode_isrc, decode_mcn};
use disc_lib::{Disc, Lba, Msf};

use crate::commands::{CmdIo, cdb_u16};
use crate::device::DeviceState;
use crate::sense::CommandError;

/// Fetch the 16-byte formatted Q of a sector, if readable.
fn sector_q(disc: &Disc, lba: Lba) -> Option<[u8; 16]> {
    disc.get_sector(lba).ok().map(|s| s.subchannel_q())
}

fn address_field(lba: i32, time: bool, with_lead_in: bool) -> [u8; 4] {
    if time {
        let msf = Lba::from(lba).to_msf(with_lead_in);
        [0, msf.m, msf.s, msf.f]
    } else {
        lba.to_be_bytes()
    }
}

/// Current-position data: Q at `current_address`, interpolated from the
/// next mode-1 Q when the current sector carries MCN or ISRC instead.
/// Addresses are converted BCD to binary; hosts expect binary here even
/// though READ CD hands out BCD.
fn current_position(
    state: &DeviceState,
    time: bool,
    data: &mut Vec<u8>,
) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;
    let current = state.current_address;

    data.push(0x01); // format code

    let mut steps = 0i32;
    let mut q = sector_q(disc, current).unwrap_or([0u8; 16]);

    // Walk forward until a mode-1 (position) Q turns up.
    while q[0] & 0x0F != ADR_MODE1_POSITION && steps < 99 {
        steps += 1;
        match sector_q(disc, current.offset(steps)) {
            Some(next) => q = next,
            None => break,
        }
    }

    data.push((q[0] >> 4) | (q[0] << 4)); // ADR/CTL, swapped for the wire
    data.push(bcd_to_hex(q[1])); // track
    data.push(bcd_to_hex(q[2])); // index

    // Q stores relative then absolute; the response wants absolute first.
    // Subtract the interpolation distance from both.
    let relative = Msf::from_bcd(q[3], q[4], q[5]).to_lba(false).raw() - steps;
    let absolute = Msf::from_bcd(q[7], q[8], q[9]).to_lba(true).raw() - steps;

    data.extend_from_slice(&address_field(absolute, time, true));
    data.extend_from_slice(&address_field(relative, time, false));
    Ok(())
}

/// MCN data: scan the first hundred sectors for a mode-2 Q.
fn catalog_number(state: &DeviceState, data: &mut Vec<u8>) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;

    data.resize(data.len() + 20, 0);
    let base = data.len() - 20;
    data[base] = 0x02;

    for address in 0..100 {
        let Some(q) = sector_q(disc, Lba::from(address)) else {
            continue;
        };
        if q[0] & 0x0F == ADR_MODE2_MCN {
            let mcn = decode_mcn(&q[1..]);
            data[base + 4] = 0x80; // MCVal
            data[base + 5..base + 18].copy_from_slice(mcn.as_bytes());
            break;
        }
    }

    Ok(())
}

/// ISRC data: scan the first hundred sectors of the requested track for a
/// mode-3 Q.
fn track_isrc(state: &DeviceState, track: u8, data: &mut Vec<u8>) -> Result<(), CommandError> {
    let disc = state.disc_loaded()?;
    let (_, track) = disc
        .track_by_number(track)
        .ok_or(CommandError::InvalidFieldInCdb)?;

    data.resize(data.len() + 20, 0);
    let base = data.len() - 20;
    data[base] = 0x03;

    for offset in 0..100 {
        let Some(q) = sector_q(disc, track.start_sector().offset(offset)) else {
            continue;
        };
        if q[0] & 0x0F == ADR_MODE3_ISRC {
            let isrc = decode_isrc(&q[1..]);
            data[base + 1] = (q[0] >> 4) | (q[0] << 4);
            data[base + 2] = track.number();
            data[base + 4] = 0x80; // TCVal
            data[base + 5..base + 17].copy_from_slice(isrc.as_bytes());
            break;
        }
    }

    Ok(())
}

pub fn read_subchannel(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let time = cdb[1] & 0x02 != 0;
    let subq = cdb[2] & 0x40 != 0;
    let format = cdb[3];
    let track = cdb[6];
    let allocation_length = cdb_u16(cdb, 7) as usize;

    state.disc_loaded()?;

    io.flush();
    let mut data = vec![0u8; 4];

    if subq {
        match format {
            0x01 => current_position(state, time, &mut data)?,
            0x02 => catalog_number(state, &mut data)?,
            0x03 => track_isrc(state, track, &mut data)?,
            _ => {} // header only
        }
    }

    data[1] = state.audio.status_byte();
    let total = data.len() as u16;
    data[2..4].copy_from_slice(&(total - 4).to_be_bytes());

    io.scratch().extend_from_slice(&data);
    io.write_buffer(allocation_length);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commands::execute;
    use crate::device::kernel_io::STATUS_GOOD;
    use crate::device::test_support;

    fn subchannel_cdb(format: u8, track: u8) -> [u8; 12] {
        [0x42, 0x02, 0x40, format, 0, 0, track, 0x00, 0x40, 0, 0, 0]
    }

    #[test]
    fn current_position_reports_track_and_addresses() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        state.current_address = Lba::from(166);

        let response = execute(&mut state, &subchannel_cdb(0x01, 0), &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data.len(), 16);
        assert_eq!(response.data[1], 0x00); // audio status: stopped
        assert_eq!(response.data[4], 0x01); // format code
        assert_eq!(response.data[5], 0x10); // ADR 1, audio CTL
        assert_eq!(response.data[6], 1); // track, binary
        assert_eq!(response.data[7], 1); // index
        // Absolute 166 => 00:04:16; relative 16 => 00:00:16.
        assert_eq!(&response.data[8..12], &[0, 0, 4, 16]);
        assert_eq!(&response.data[12..16], &[0, 0, 0, 16]);
    }

    #[test]
    fn current_position_lba_form() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        state.current_address = Lba::from(166);

        let cdb = [0x42, 0x00, 0x40, 0x01, 0, 0, 0, 0x00, 0x40, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(&response.data[8..12], &166i32.to_be_bytes());
        assert_eq!(&response.data[12..16], &16i32.to_be_bytes());
    }

    #[test]
    fn mcn_scan_finds_catalog() {
        let mut disc = test_support::audio_disc();
        disc.first_session_mut().unwrap().mcn = Some("5099702935521".to_string());
        let mut state = test_support::loaded_state(disc);

        let response = execute(&mut state, &subchannel_cdb(0x02, 0), &[], 4096);
        assert_eq!(response.data[8], 0x80); // MCVal
        assert_eq!(&response.data[9..22], b"5099702935521");
    }

    #[test]
    fn isrc_scan_finds_code() {
        let mut disc = test_support::audio_disc();
        disc.first_session_mut()
            .unwrap()
            .last_track_mut()
            .unwrap()
            .set_isrc("GBAYE0500123");
        disc.relayout();
        let mut state = test_support::loaded_state(disc);

        let response = execute(&mut state, &subchannel_cdb(0x03, 1), &[], 4096);
        assert_eq!(response.data[8], 0x80); // TCVal
        assert_eq!(&response.data[9..21], b"GBAYE0500123");
    }

    #[test]
    fn isrc_for_unknown_track_rejected() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let response = execute(&mut state, &subchannel_cdb(0x03, 9), &[], 4096);
        assert_eq!(response.data[12], 0x24);
    }

    #[test]
    fn no_subq_returns_header_only() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let cdb = [0x42, 0x02, 0x00, 0x01, 0, 0, 0, 0x00, 0x40, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.data.len(), 4);
    }
}
