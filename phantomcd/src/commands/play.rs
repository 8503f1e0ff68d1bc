//! PLAY AUDIO (10/12/MSF) and PAUSE/RESUME.

use disc_lib::Msf;

use crate::commands::{CmdIo, cdb_u16, cdb_u32, opcode};
use crate::device::DeviceState;
use crate::device::audio::AudioStatus;
use crate::sense::CommandError;

pub fn play_audio(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    let (start_sector, end_sector) = match cdb[0] {
        opcode::PLAY_AUDIO_10 => {
            let lba = cdb_u32(cdb, 2) as i32;
            (lba, lba + cdb_u16(cdb, 7) as i32)
        }
        opcode::PLAY_AUDIO_12 => {
            let lba = cdb_u32(cdb, 2) as i32;
            (lba, lba + cdb_u32(cdb, 6) as i32)
        }
        _ => {
            // PLAY AUDIO MSF
            let start = Msf::new(cdb[3], cdb[4], cdb[5]).to_lba(true).raw();
            let end = Msf::new(cdb[6], cdb[7], cdb[8]).to_lba(true).raw();
            (start, end)
        }
    };

    state.disc_loaded()?;
    state.audio_start(start_sector, end_sector)
}

pub fn pause_resume(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    let resume = cdb[8] & 0x01 != 0;
    let status = state.audio.status;

    // Both directions demand a pausable/resumable operation; already being
    // in the target state is not an error.
    if !matches!(status, AudioStatus::Playing | AudioStatus::Paused) {
        return Err(CommandError::CommandSequenceError);
    }

    if resume {
        state.audio.resume();
    } else {
        state.audio.pause();
    }

    Ok(())
}
