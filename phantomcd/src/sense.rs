//! Fixed-format sense data.
//!
//! Every protocol-level failure is a `CommandError` variant; the
//! `#[sense(...)]` attribute on each variant carries the (key, ASC, ASCQ)
//! triple the derive turns into the `sense()` accessor. The dispatcher
//! converts a failed handler into an 18-byte fixed sense block returned with
//! CHECK CONDITION status.

use mmc_errors::SenseData;
use thiserror::Error;

pub const SENSE_LEN: usize = 18;

/// Sense keys used by this device.
pub mod key {
    pub const NO_SENSE: u8 = 0x00;
    pub const NOT_READY: u8 = 0x02;
    pub const MEDIUM_ERROR: u8 = 0x03;
    pub const ILLEGAL_REQUEST: u8 = 0x05;
    pub const UNIT_ATTENTION: u8 = 0x06;
}

#[derive(Error, SenseData, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("INVALID COMMAND OPERATION CODE")]
    #[sense(key = 0x05, asc = 0x20, ascq = 0x00)]
    InvalidCommandOperationCode,
    #[error("INVALID FIELD IN CDB")]
    #[sense(key = 0x05, asc = 0x24, ascq = 0x00)]
    InvalidFieldInCdb,
    #[error("INVALID FIELD IN PARAMETER LIST")]
    #[sense(key = 0x05, asc = 0x26, ascq = 0x00)]
    InvalidFieldInParameterList,
    #[error("SAVING PARAMETERS NOT SUPPORTED")]
    #[sense(key = 0x05, asc = 0x39, ascq = 0x00)]
    SavingParametersNotSupported,
    #[error("COMMAND SEQUENCE ERROR")]
    #[sense(key = 0x05, asc = 0x2C, ascq = 0x00)]
    CommandSequenceError,
    #[error("ILLEGAL MODE FOR THIS TRACK")]
    #[sense(key = 0x05, asc = 0x64, ascq = 0x00)]
    IllegalModeForThisTrack { ili: bool, address: i32 },
    #[error("UNRECOVERED READ ERROR")]
    #[sense(key = 0x03, asc = 0x11, ascq = 0x00)]
    UnrecoveredReadError { address: i32 },
    #[error("MEDIUM NOT PRESENT")]
    #[sense(key = 0x02, asc = 0x3A, ascq = 0x00)]
    MediumNotPresent,
    #[error("MEDIUM REMOVAL PREVENTED")]
    #[sense(key = 0x02, asc = 0x53, ascq = 0x02)]
    MediumRemovalPrevented,
    #[error("NOT READY TO READY CHANGE, MEDIUM MAY HAVE CHANGED")]
    #[sense(key = 0x06, asc = 0x28, ascq = 0x00)]
    NotReadyToReadyChange,
    #[error("CANNOT READ MEDIUM - INCOMPATIBLE FORMAT")]
    #[sense(key = 0x05, asc = 0x30, ascq = 0x02)]
    CannotReadMediumIncompatibleFormat,
}

impl CommandError {
    fn ili(&self) -> bool {
        matches!(self, CommandError::IllegalModeForThisTrack { ili: true, .. })
    }

    /// The failing block address, reported in the command information field.
    fn command_info(&self) -> Option<i32> {
        match self {
            CommandError::IllegalModeForThisTrack { address, .. } => Some(*address),
            CommandError::UnrecoveredReadError { address } => Some(*address),
            _ => None,
        }
    }
}

/// Assemble an 18-byte fixed sense block: response code 0x70, additional
/// length 0x0A, plus the error's key/ASC/ASCQ and optional ILI and command
/// information.
pub fn sense_block(error: &CommandError) -> [u8; SENSE_LEN] {
    let (sense_key, asc, ascq) = error.sense();
    let mut block = [0u8; SENSE_LEN];

    block[0] = 0x70;
    block[2] = sense_key;
    if error.ili() {
        block[2] |= 0x20;
    }
    if let Some(info) = error.command_info() {
        block[3..7].copy_from_slice(&info.to_be_bytes());
    }
    block[7] = 0x0A;
    block[12] = asc;
    block[13] = ascq;

    block
}

/// The synthetic "no sense" block REQUEST SENSE reports, carrying the audio
/// status in the ASCQ field per the MMC play-status contract.
pub fn sense_block_audio_status(audio_status: u8) -> [u8; SENSE_LEN] {
    let mut block = [0u8; SENSE_LEN];
    block[0] = 0x70;
    block[2] = key::NO_SENSE;
    block[7] = 0x0A;
    block[12] = 0x00; // NO ADDITIONAL SENSE INFORMATION
    block[13] = audio_status;
    block
}
