//! Unit state commands: TEST UNIT READY, START/STOP UNIT, PREVENT/ALLOW
//! MEDIUM REMOVAL, REQUEST SENSE, SEEK.

use crate::commands::CmdIo;
use crate::device::{DeviceState, MediaEvent};
use crate::sense::{CommandError, sense_block_audio_status};

pub fn test_unit_ready(
    state: &mut DeviceState,
    _cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    if !state.loaded {
        return Err(CommandError::MediumNotPresent);
    }

    // A fresh medium owes the host one UNIT ATTENTION so the block layer
    // re-reads the medium parameters; the latch then clears.
    if state.media_event == MediaEvent::NewMedia {
        state.media_event = MediaEvent::NoChange;
        return Err(CommandError::NotReadyToReadyChange);
    }

    Ok(())
}

pub fn start_stop_unit(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    let load_eject = cdb[4] & 0x02 != 0;
    let start = cdb[4] & 0x01 != 0;

    if load_eject && !start {
        state
            .unload_disc(false)
            .map_err(|_| CommandError::MediumRemovalPrevented)?;
    }

    Ok(())
}

pub fn prevent_allow_medium_removal(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    let prevent = cdb[4] & 0x01 != 0;
    state.set_locked(prevent);
    Ok(())
}

pub fn request_sense(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let allocation_length = cdb[4] as usize;

    // Deferred errors are never generated; what remains is the audio-status
    // reporting contract: NO SENSE with the status in the ASCQ field.
    let block = sense_block_audio_status(state.audio.status_byte());

    io.flush();
    io.scratch().extend_from_slice(&block);
    io.write_buffer(allocation_length);
    Ok(())
}

pub fn seek(
    _state: &mut DeviceState,
    _cdb: &[u8; 12],
    _io: &mut CmdIo,
) -> Result<(), CommandError> {
    // The head is imaginary; arrival is immediate.
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commands::execute;
    use crate::device::kernel_io::{STATUS_CHECK_CONDITION, STATUS_GOOD};
    use crate::device::mode_pages::PageFlavor;
    use crate::device::test_support;

    const TEST_UNIT_READY: [u8; 12] = [0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

    #[test]
    fn unit_attention_after_load_then_ready() {
        let mut state = test_support::loaded_state(test_support::audio_disc());

        let first = execute(&mut state, &TEST_UNIT_READY, &[], 4096);
        assert_eq!(first.status, STATUS_CHECK_CONDITION);
        assert_eq!(first.data[2], 0x06);
        assert_eq!(first.data[12], 0x28);

        let second = execute(&mut state, &TEST_UNIT_READY, &[], 4096);
        assert_eq!(second.status, STATUS_GOOD);
    }

    #[test]
    fn not_ready_without_medium() {
        let mut state = test_support::state();
        let response = execute(&mut state, &TEST_UNIT_READY, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[2], 0x02);
        assert_eq!(response.data[12], 0x3A);
    }

    #[test]
    fn eject_blocked_while_locked() {
        let mut state = test_support::loaded_state(test_support::audio_disc());

        let prevent = [0x1E, 0, 0, 0, 0x01, 0, 0, 0, 0, 0, 0, 0];
        execute(&mut state, &prevent, &[], 4096);
        assert!(state.locked);
        assert_eq!(
            state.mode_pages.get(0x2A, PageFlavor::Current).unwrap()[6] & 0x02,
            0x02
        );

        let eject = [0x1B, 0, 0, 0, 0x02, 0, 0, 0, 0, 0, 0, 0];
        let response = execute(&mut state, &eject, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x53);
        assert_eq!(response.data[13], 0x02);
        assert!(state.loaded);

        let allow = [0x1E, 0, 0, 0, 0x00, 0, 0, 0, 0, 0, 0, 0];
        execute(&mut state, &allow, &[], 4096);
        let response = execute(&mut state, &eject, &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        assert!(!state.loaded);
    }

    #[test]
    fn request_sense_reports_audio_status() {
        let mut state = test_support::loaded_state(test_support::audio_disc());
        let play = [0x45, 0, 0, 0, 0, 150, 0, 0, 75, 0, 0, 0];
        execute(&mut state, &play, &[], 4096);

        let request_sense = [0x03, 0, 0, 0, 18, 0, 0, 0, 0, 0, 0, 0];
        let response = execute(&mut state, &request_sense, &[], 4096);
        assert_eq!(response.status, STATUS_GOOD);
        assert_eq!(response.data[2], 0x00); // NO SENSE
        assert_eq!(response.data[13], 0x11); // audio in progress
    }

    #[test]
    fn seek_succeeds() {
        let mut state = test_support::state();
        let cdb = [0x2B, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(execute(&mut state, &cdb, &[], 4096).status, STATUS_GOOD);
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut state = test_support::state();
        let cdb = [0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let response = execute(&mut state, &cdb, &[], 4096);
        assert_eq!(response.status, STATUS_CHECK_CONDITION);
        assert_eq!(response.data[12], 0x20);
    }
}
