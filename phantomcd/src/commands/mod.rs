//! CDB dispatch.
//!
//! Commands are matched by opcode against a static table; the handler runs
//! with the device mutex already held by the transport thread. Commands
//! flagged as disturbing stop a running audio operation before the handler
//! body, so the audio engine never observes a dispatcher-initiated stop
//! mid-command.

use tracing::{debug, warn};

use crate::device::DeviceState;
use crate::device::audio::AudioStatus;
use crate::device::kernel_io::{STATUS_CHECK_CONDITION, STATUS_GOOD};
use crate::sense::{CommandError, sense_block};

mod config;
mod info;
mod inquiry;
mod mode;
mod play;
mod read;
mod subchannel;
mod toc;
mod unit;

pub mod opcode {
    pub const TEST_UNIT_READY: u8 = 0x00;
    pub const REQUEST_SENSE: u8 = 0x03;
    pub const INQUIRY: u8 = 0x12;
    pub const MODE_SELECT_6: u8 = 0x15;
    pub const MODE_SENSE_6: u8 = 0x1A;
    pub const START_STOP_UNIT: u8 = 0x1B;
    pub const PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;
    pub const READ_CAPACITY: u8 = 0x25;
    pub const READ_10: u8 = 0x28;
    pub const SEEK_10: u8 = 0x2B;
    pub const READ_SUBCHANNEL: u8 = 0x42;
    pub const READ_TOC_PMA_ATIP: u8 = 0x43;
    pub const PLAY_AUDIO_10: u8 = 0x45;
    pub const GET_CONFIGURATION: u8 = 0x46;
    pub const PLAY_AUDIO_MSF: u8 = 0x47;
    pub const GET_EVENT_STATUS_NOTIFICATION: u8 = 0x4A;
    pub const PAUSE_RESUME: u8 = 0x4B;
    pub const READ_DISC_INFORMATION: u8 = 0x51;
    pub const READ_TRACK_INFORMATION: u8 = 0x52;
    pub const MODE_SELECT_10: u8 = 0x55;
    pub const MODE_SENSE_10: u8 = 0x5A;
    pub const REPORT_KEY: u8 = 0xA4;
    pub const PLAY_AUDIO_12: u8 = 0xA5;
    pub const READ_12: u8 = 0xA8;
    pub const READ_DVD_STRUCTURE: u8 = 0xAD;
    pub const SET_CD_SPEED: u8 = 0xBB;
    pub const READ_CD: u8 = 0xBE;
    pub const READ_CD_MSF: u8 = 0xB9;
}

/// Per-command buffers: the incoming parameter data, the outgoing response,
/// and the scratch cache handlers assemble into before committing a chunk.
pub struct CmdIo<'a> {
    pub data_in: &'a [u8],
    out: Vec<u8>,
    out_limit: usize,
    scratch: Vec<u8>,
}

/// Scratch cache size; enough for one raw sector plus headers.
const SCRATCH_SIZE: usize = 4096;

impl<'a> CmdIo<'a> {
    pub fn new(data_in: &'a [u8], out_limit: usize) -> CmdIo<'a> {
        CmdIo {
            data_in,
            out: Vec::new(),
            out_limit,
            scratch: Vec::with_capacity(SCRATCH_SIZE),
        }
    }

    pub fn flush(&mut self) {
        self.scratch.clear();
    }

    pub fn scratch(&mut self) -> &mut Vec<u8> {
        &mut self.scratch
    }

    /// Copy parameter data into the scratch cache.
    pub fn read_buffer(&mut self, length: usize) {
        self.scratch.clear();
        let length = length.min(self.data_in.len());
        self.scratch.extend_from_slice(&self.data_in[..length]);
    }

    /// Commit the scratch cache to the response, bounded by the caller's
    /// allocation length and by the transport's data-in window.
    pub fn write_buffer(&mut self, length: usize) {
        let mut length = length.min(self.scratch.len());
        length = length.min(self.out_limit.saturating_sub(self.out.len()));
        self.out.extend_from_slice(&self.scratch[..length]);
        self.flush();
    }

    fn into_response(self, status: u32) -> Response {
        Response {
            status,
            data: self.out,
        }
    }
}

pub struct Response {
    pub status: u32,
    pub data: Vec<u8>,
}

type Handler = fn(&mut DeviceState, &[u8; 12], &mut CmdIo) -> Result<(), CommandError>;

struct PacketCommand {
    opcode: u8,
    name: &'static str,
    disturbs_audio: bool,
    handler: Handler,
}

static PACKET_COMMANDS: &[PacketCommand] = &[
    PacketCommand {
        opcode: opcode::GET_EVENT_STATUS_NOTIFICATION,
        name: "GET EVENT/STATUS NOTIFICATION",
        disturbs_audio: false,
        handler: config::get_event_status_notification,
    },
    PacketCommand {
        opcode: opcode::GET_CONFIGURATION,
        name: "GET CONFIGURATION",
        disturbs_audio: true,
        handler: config::get_configuration,
    },
    PacketCommand {
        opcode: opcode::INQUIRY,
        name: "INQUIRY",
        disturbs_audio: false,
        handler: inquiry::inquiry,
    },
    PacketCommand {
        opcode: opcode::MODE_SELECT_6,
        name: "MODE SELECT (6)",
        disturbs_audio: true,
        handler: mode::mode_select,
    },
    PacketCommand {
        opcode: opcode::MODE_SELECT_10,
        name: "MODE SELECT (10)",
        disturbs_audio: true,
        handler: mode::mode_select,
    },
    PacketCommand {
        opcode: opcode::MODE_SENSE_6,
        name: "MODE SENSE (6)",
        disturbs_audio: true,
        handler: mode::mode_sense,
    },
    PacketCommand {
        opcode: opcode::MODE_SENSE_10,
        name: "MODE SENSE (10)",
        disturbs_audio: true,
        handler: mode::mode_sense,
    },
    PacketCommand {
        opcode: opcode::PAUSE_RESUME,
        name: "PAUSE/RESUME",
        disturbs_audio: false,
        handler: play::pause_resume,
    },
    PacketCommand {
        opcode: opcode::PLAY_AUDIO_10,
        name: "PLAY AUDIO (10)",
        disturbs_audio: true,
        handler: play::play_audio,
    },
    PacketCommand {
        opcode: opcode::PLAY_AUDIO_12,
        name: "PLAY AUDIO (12)",
        disturbs_audio: true,
        handler: play::play_audio,
    },
    PacketCommand {
        opcode: opcode::PLAY_AUDIO_MSF,
        name: "PLAY AUDIO MSF",
        disturbs_audio: true,
        handler: play::play_audio,
    },
    PacketCommand {
        opcode: opcode::PREVENT_ALLOW_MEDIUM_REMOVAL,
        name: "PREVENT/ALLOW MEDIUM REMOVAL",
        disturbs_audio: true,
        handler: unit::prevent_allow_medium_removal,
    },
    PacketCommand {
        opcode: opcode::READ_10,
        name: "READ (10)",
        disturbs_audio: true,
        handler: read::read,
    },
    PacketCommand {
        opcode: opcode::READ_12,
        name: "READ (12)",
        disturbs_audio: true,
        handler: read::read,
    },
    PacketCommand {
        opcode: opcode::READ_CAPACITY,
        name: "READ CAPACITY",
        disturbs_audio: false,
        handler: read::read_capacity,
    },
    PacketCommand {
        opcode: opcode::READ_CD,
        name: "READ CD",
        disturbs_audio: true,
        handler: read::read_cd,
    },
    PacketCommand {
        opcode: opcode::READ_CD_MSF,
        name: "READ CD MSF",
        disturbs_audio: true,
        handler: read::read_cd,
    },
    PacketCommand {
        opcode: opcode::READ_DISC_INFORMATION,
        name: "READ DISC INFORMATION",
        disturbs_audio: true,
        handler: info::read_disc_information,
    },
    PacketCommand {
        opcode: opcode::READ_DVD_STRUCTURE,
        name: "READ DVD STRUCTURE",
        disturbs_audio: true,
        handler: info::read_dvd_structure,
    },
    PacketCommand {
        opcode: opcode::READ_TOC_PMA_ATIP,
        name: "READ TOC/PMA/ATIP",
        disturbs_audio: true,
        handler: toc::read_toc_pma_atip,
    },
    PacketCommand {
        opcode: opcode::READ_TRACK_INFORMATION,
        name: "READ TRACK INFORMATION",
        disturbs_audio: true,
        handler: info::read_track_information,
    },
    PacketCommand {
        opcode: opcode::READ_SUBCHANNEL,
        name: "READ SUBCHANNEL",
        disturbs_audio: false,
        handler: subchannel::read_subchannel,
    },
    PacketCommand {
        opcode: opcode::REPORT_KEY,
        name: "REPORT KEY",
        disturbs_audio: true,
        handler: info::report_key,
    },
    PacketCommand {
        opcode: opcode::REQUEST_SENSE,
        name: "REQUEST SENSE",
        disturbs_audio: false,
        handler: unit::request_sense,
    },
    PacketCommand {
        opcode: opcode::SEEK_10,
        name: "SEEK (10)",
        disturbs_audio: false,
        handler: unit::seek,
    },
    PacketCommand {
        opcode: opcode::SET_CD_SPEED,
        name: "SET CD SPEED",
        disturbs_audio: true,
        handler: mode::set_cd_speed,
    },
    PacketCommand {
        opcode: opcode::START_STOP_UNIT,
        name: "START/STOP UNIT",
        disturbs_audio: true,
        handler: unit::start_stop_unit,
    },
    PacketCommand {
        opcode: opcode::TEST_UNIT_READY,
        name: "TEST UNIT READY",
        disturbs_audio: false,
        handler: unit::test_unit_ready,
    },
];

/// Run one CDB to completion. Handler failures become sense data returned
/// with CHECK CONDITION; the partial response is discarded.
pub fn execute(state: &mut DeviceState, cdb: &[u8; 12], data_in: &[u8], out_limit: usize) -> Response {
    let Some(command) = PACKET_COMMANDS.iter().find(|c| c.opcode == cdb[0]) else {
        warn!(opcode = cdb[0], "unknown packet command");
        return Response {
            status: STATUS_CHECK_CONDITION,
            data: sense_block(&CommandError::InvalidCommandOperationCode).to_vec(),
        };
    };

    debug!(command = command.name, cdb = ?cdb, "executing");

    if command.disturbs_audio
        && matches!(
            state.audio.status,
            AudioStatus::Playing | AudioStatus::Paused
        )
    {
        state.audio.stop();
    }

    let mut io = CmdIo::new(data_in, out_limit);
    match (command.handler)(state, cdb, &mut io) {
        Ok(()) => io.into_response(STATUS_GOOD),
        Err(error) => {
            debug!(command = command.name, %error, "check condition");
            Response {
                status: STATUS_CHECK_CONDITION,
                data: sense_block(&error).to_vec(),
            }
        }
    }
}

/// Big-endian field helpers for CDB parsing.
pub(crate) fn cdb_u16(cdb: &[u8; 12], at: usize) -> u16 {
    u16::from_be_bytes([cdb[at], cdb[at + 1]])
}

pub(crate) fn cdb_u32(cdb: &[u8; 12], at: usize) -> u32 {
    u32::from_be_bytes([cdb[at], cdb[at + 1], cdb[at + 2], cdb[at + 3]])
}

pub(crate) fn cdb_u24(cdb: &[u8; 12], at: usize) -> u32 {
    u32::from_be_bytes([0, cdb[at], cdb[at + 1], cdb[at + 2]])
}
