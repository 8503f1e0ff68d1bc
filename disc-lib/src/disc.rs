//! The disc: sessions, layout, structures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::addressing::Lba;
use crate::dpm::DpmData;
use crate::sector::{QContext, Sector, SectorType};
use crate::session::{Session, SessionType};
use crate::track::{TRACK_LEADOUT, Track};
use crate::{DiscError, DiscResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MediumType {
    Cd = 0,
    Dvd = 1,
    Bd = 2,
    Hd = 3,
}

pub struct Disc {
    medium_type: MediumType,
    /// Address of the first layout sector; -150 on CD so that LBA 0 is the
    /// start of the user area.
    layout_start: i32,
    sessions: Vec<Session>,
    /// DVD structures keyed by (layer, format).
    structures: BTreeMap<(u8, u8), Vec<u8>>,
    dpm: Option<DpmData>,
    filenames: Vec<PathBuf>,
}

impl Disc {
    pub fn new(medium_type: MediumType) -> Disc {
        let layout_start = match medium_type {
            MediumType::Cd => -150,
            _ => 0,
        };
        Disc {
            medium_type,
            layout_start,
            sessions: Vec::new(),
            structures: BTreeMap::new(),
            dpm: None,
            filenames: Vec::new(),
        }
    }

    pub fn medium_type(&self) -> MediumType {
        self.medium_type
    }

    pub fn set_medium_type(&mut self, medium_type: MediumType) {
        self.medium_type = medium_type;
    }

    pub fn layout_start(&self) -> Lba {
        Lba::from(self.layout_start)
    }

    pub fn set_layout_start(&mut self, start: i32) {
        self.layout_start = start;
        self.relayout();
    }

    pub fn filenames(&self) -> &[PathBuf] {
        &self.filenames
    }

    pub fn set_filenames<P: AsRef<Path>>(&mut self, filenames: &[P]) {
        self.filenames = filenames.iter().map(|p| p.as_ref().to_path_buf()).collect();
    }

    /// Append a session and hand it back for population. Callers must run
    /// [`Disc::relayout`] once the session's tracks and fragments are in
    /// place (the convenience builders in tests do this implicitly).
    pub fn add_session(&mut self, session_type: SessionType) -> &mut Session {
        self.sessions.push(Session::new(session_type));
        // Just pushed, cannot be empty.
        self.sessions.last_mut().unwrap()
    }

    /// Recompute session numbers, track numbers and absolute start sectors
    /// from the current tree. Idempotent; call after structural changes.
    pub fn relayout(&mut self) {
        let mut address = self.layout_start;
        let mut track_number = 1u8;

        for (session_index, session) in self.sessions.iter_mut().enumerate() {
            let session_number = session_index as u8 + 1;
            session.set_number(session_number);
            session.set_start_sector(address);

            for track in session.tracks_mut() {
                track.assign_position(track_number, session_number, address);
                address += track.length();
                track_number += 1;
            }

            address += session.leadout_length();
        }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Session by position; negative indices count from the end (-1 = last).
    pub fn session_by_index(&self, index: i32) -> Option<&Session> {
        let resolved = if index < 0 {
            self.sessions.len().checked_sub(index.unsigned_abs() as usize)?
        } else {
            index as usize
        };
        self.sessions.get(resolved)
    }

    pub fn session_by_index_mut(&mut self, index: i32) -> Option<&mut Session> {
        let resolved = if index < 0 {
            self.sessions.len().checked_sub(index.unsigned_abs() as usize)?
        } else {
            index as usize
        };
        self.sessions.get_mut(resolved)
    }

    pub fn session_by_number(&self, number: u8) -> Option<&Session> {
        self.sessions.iter().find(|s| s.number() == number)
    }

    pub fn last_session_mut(&mut self) -> Option<&mut Session> {
        self.sessions.last_mut()
    }

    pub fn first_session_mut(&mut self) -> Option<&mut Session> {
        self.sessions.first_mut()
    }

    pub fn num_tracks(&self) -> usize {
        self.sessions.iter().map(|s| s.tracks().len()).sum()
    }

    /// Track by disc-wide position; -1 addresses the last track.
    pub fn track_by_index(&self, index: i32) -> Option<(&Session, &Track)> {
        let mut flat: Vec<(&Session, &Track)> = Vec::new();
        for session in &self.sessions {
            for track in session.tracks() {
                flat.push((session, track));
            }
        }
        if index == -1 {
            flat.pop()
        } else {
            flat.get(index as usize).copied()
        }
    }

    pub fn track_by_number(&self, number: u8) -> Option<(&Session, &Track)> {
        for session in &self.sessions {
            if let Some(track) = session.track_by_number(number) {
                return Some((session, track));
            }
        }
        None
    }

    /// The real track whose address range contains `lba`.
    pub fn track_by_address(&self, lba: Lba) -> Option<(&Session, &Track)> {
        for session in &self.sessions {
            for track in session.tracks() {
                let start = track.start_sector().raw();
                if (start..start + track.length()).contains(&lba.raw()) {
                    return Some((session, track));
                }
            }
        }
        None
    }

    /// Total layout length in sectors, lead-out gaps included.
    pub fn layout_length(&self) -> i32 {
        self.sessions.iter().map(Session::length).sum()
    }

    /// Resolve and materialize the sector at `lba`. Lead-out gaps yield
    /// synthesized empty sectors typed after the session.
    pub fn get_sector(&self, lba: Lba) -> DiscResult<Sector> {
        if let Some((session, track)) = self.track_by_address(lba) {
            let track_offset = lba.raw() - track.start_sector().raw();
            return track.build_sector(track_offset, lba, session.mcn.as_deref());
        }

        // Lead-out (or inter-session gap) sector.
        for session in &self.sessions {
            let leadout_start = session.leadout_start().raw();
            let leadout_end = leadout_start + session.leadout_length();
            if (leadout_start..leadout_end).contains(&lba.raw()) {
                let kind = match session.session_type {
                    SessionType::CdDa => SectorType::Audio,
                    _ => SectorType::Mode1,
                };
                let ctx = QContext {
                    track: TRACK_LEADOUT,
                    index: 1,
                    relative: Lba::from(lba.raw() - leadout_start).to_msf(false),
                    track_offset: lba.raw() - leadout_start,
                    ctl: if kind == SectorType::Audio { 0x00 } else { 0x04 },
                    leadout: true,
                    mcn: None,
                    isrc: None,
                };
                return Ok(Sector::empty(kind, lba, &ctx));
            }
        }

        Err(DiscError::OutOfRange(lba))
    }

    pub fn structure(&self, layer: u8, format: u8) -> Option<&[u8]> {
        self.structures.get(&(layer, format)).map(Vec::as_slice)
    }

    pub fn set_structure(&mut self, layer: u8, format: u8, data: Vec<u8>) {
        self.structures.insert((layer, format), data);
    }

    pub fn dpm(&self) -> Option<&DpmData> {
        self.dpm.as_ref()
    }

    pub fn set_dpm(&mut self, dpm: DpmData) {
        self.dpm = Some(dpm);
    }
}
