//! Tracks: ordered fragment runs with layout and subcode attributes.

use bitflags::bitflags;

use crate::addressing::{Lba, Msf};
use crate::cdtext::Language;
use crate::fragment::{Fragment, SubFormat};
use crate::sector::{MAIN_SIZE, QContext, SUB_SIZE, Sector, SectorType};
use crate::subchannel;
use crate::{DiscError, DiscResult};

/// Pseudo track number of the session lead-in.
pub const TRACK_LEADIN: u8 = 0x00;
/// Pseudo track number of the session lead-out.
pub const TRACK_LEADOUT: u8 = 0xAA;

bitflags! {
    /// Track attribute flags feeding the CTL nibble.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TrackFlags: u8 {
        const PREEMPHASIS = 1 << 0;
        const COPY_PERMITTED = 1 << 1;
        const FOUR_CHANNEL = 1 << 3;
    }
}

pub struct Track {
    number: u8,
    session_number: u8,
    kind: SectorType,
    pub flags: TrackFlags,
    isrc: Option<String>,
    fragments: Vec<Fragment>,
    /// Pregap length in sectors; index 1 begins here.
    track_start: i32,
    /// Track-relative addresses of indices 2.., ascending.
    indices: Vec<i32>,
    /// Absolute start, assigned by the disc layout pass.
    start_sector: i32,
    languages: Vec<Language>,
}

impl Track {
    pub fn new(kind: SectorType) -> Track {
        Track {
            number: 0,
            session_number: 0,
            kind,
            flags: TrackFlags::empty(),
            isrc: None,
            fragments: Vec::new(),
            track_start: 0,
            indices: Vec::new(),
            start_sector: 0,
            languages: Vec::new(),
        }
    }

    pub fn kind(&self) -> SectorType {
        self.kind
    }

    pub fn set_kind(&mut self, kind: SectorType) {
        self.kind = kind;
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn session_number(&self) -> u8 {
        self.session_number
    }

    pub(crate) fn assign_position(&mut self, number: u8, session_number: u8, start_sector: i32) {
        self.number = number;
        self.session_number = session_number;
        self.start_sector = start_sector;
    }

    /// Absolute address of the first sector (pregap included).
    pub fn start_sector(&self) -> Lba {
        Lba::from(self.start_sector)
    }

    /// Layout length: the sum of the fragment lengths.
    pub fn length(&self) -> i32 {
        self.fragments.iter().map(Fragment::length).sum()
    }

    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Prepend a fragment (implicit Red Book pregap insertion).
    pub fn insert_fragment_front(&mut self, fragment: Fragment) {
        self.fragments.insert(0, fragment);
    }

    pub fn last_fragment_mut(&mut self) -> Option<&mut Fragment> {
        self.fragments.last_mut()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn track_start(&self) -> i32 {
        self.track_start
    }

    pub fn set_track_start(&mut self, track_start: i32) {
        self.track_start = track_start;
    }

    /// Register an index point (index 2..) at a track-relative address.
    pub fn add_index(&mut self, address: i32) {
        self.indices.push(address);
        self.indices.sort_unstable();
    }

    pub fn isrc(&self) -> Option<&str> {
        self.isrc.as_deref()
    }

    pub fn set_isrc(&mut self, isrc: impl Into<String>) {
        self.isrc = Some(isrc.into());
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn add_language(&mut self, language: Language) -> &mut Language {
        self.languages.push(language);
        // Just pushed, cannot be empty.
        self.languages.last_mut().unwrap()
    }

    /// CTL nibble: data bit plus attribute flags.
    pub fn ctl(&self) -> u8 {
        let mut ctl = self.flags.bits();
        if self.kind != SectorType::Audio {
            ctl |= 0x04;
        }
        ctl
    }

    pub fn adr(&self) -> u8 {
        subchannel::ADR_MODE1_POSITION
    }

    /// Index number at a track-relative offset: 0 in the pregap, then 1
    /// until the first registered index point.
    pub fn index_at(&self, track_offset: i32) -> u8 {
        if track_offset < self.track_start {
            return 0;
        }
        let extra = self
            .indices
            .iter()
            .filter(|&&address| address <= track_offset)
            .count();
        1 + extra as u8
    }

    /// Relative MSF for the Q subchannel: counts down through the pregap,
    /// up from index 1.
    fn relative_msf(&self, track_offset: i32) -> Msf {
        let relative = if track_offset < self.track_start {
            self.track_start - track_offset
        } else {
            track_offset - self.track_start
        };
        Lba::from(relative).to_msf(false)
    }

    fn fragment_at(&self, track_offset: i32) -> Option<(&Fragment, i32)> {
        let mut remaining = track_offset;
        for fragment in &self.fragments {
            if remaining < fragment.length() {
                return Some((fragment, remaining));
            }
            remaining -= fragment.length();
        }
        None
    }

    /// Materialize the sector at a track-relative offset. `mcn` is the
    /// containing session's catalog number, woven into synthesized Q.
    pub fn build_sector(
        &self,
        track_offset: i32,
        address: Lba,
        mcn: Option<&str>,
    ) -> DiscResult<Sector> {
        let (fragment, fragment_offset) = self
            .fragment_at(track_offset)
            .ok_or(DiscError::BadTrack(address))?;

        let mut main = [0u8; MAIN_SIZE];
        let main_len = fragment.read_main(fragment_offset, &mut main)?;

        let mut sub = [0u8; SUB_SIZE];
        let sub_len = fragment.read_sub(fragment_offset, &mut sub)?;

        let ctx = QContext {
            track: self.number,
            index: self.index_at(track_offset),
            relative: self.relative_msf(track_offset),
            track_offset,
            ctl: self.ctl(),
            leadout: self.number == TRACK_LEADOUT,
            mcn: mcn.map(str::to_string),
            isrc: self.isrc.clone(),
        };

        let sub_ref = if sub_len == SUB_SIZE {
            if let Fragment::Binary { sub_format, .. } = fragment {
                if sub_format.contains(SubFormat::PW96_LINEAR) {
                    sub = interleave_linear_pw(&sub);
                }
            }
            Some(&sub)
        } else {
            None
        };

        Sector::from_image(self.kind, address, &main[..main_len], sub_ref, &ctx)
    }
}

/// Convert channel-major (P..W as eight 12-byte runs) subchannel data into
/// the interleaved layout sectors carry.
fn interleave_linear_pw(linear: &[u8; SUB_SIZE]) -> [u8; SUB_SIZE] {
    let mut out = [0u8; SUB_SIZE];
    for channel in 0..8 {
        for i in 0..SUB_SIZE {
            let bit = (linear[channel * 12 + i / 8] >> (7 - (i % 8))) & 1;
            out[i] |= bit << (7 - channel);
        }
    }
    out
}
