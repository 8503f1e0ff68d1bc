//! Sessions: ordered tracks plus lead-in/lead-out bookkeeping.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::addressing::Lba;
use crate::cdtext::{self, Language, PackData};
use crate::track::Track;

/// Sectors a session lead-in occupies on a pressed disc. The lead-in is not
/// part of the addressable layout; the constant only feeds lead-in address
/// reporting.
pub const LEADIN_LENGTH: i32 = 4500;

/// Combined gap before the second session (previous lead-out + lead-in).
pub const FIRST_SESSION_GAP: i32 = 11250;
/// Combined gap before third and later sessions.
pub const LATER_SESSION_GAP: i32 = 6750;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SessionType {
    CdDa = 0,
    CdRom = 1,
    CdRomXa = 2,
    CdI = 3,
}

impl SessionType {
    /// Disc-type / session-format code as reported by READ DISC INFORMATION
    /// and the raw TOC A0 descriptor.
    pub fn format_code(self) -> u8 {
        match self {
            SessionType::CdDa | SessionType::CdRom => 0x00,
            SessionType::CdI => 0x10,
            SessionType::CdRomXa => 0x20,
        }
    }
}

pub struct Session {
    number: u8,
    pub session_type: SessionType,
    tracks: Vec<Track>,
    /// Gap after this session's program area; 0 for the last session.
    leadout_length: i32,
    pub mcn: Option<String>,
    languages: Vec<Language>,
    raw_cdtext: Option<Vec<u8>>,
    /// Absolute start, assigned by the disc layout pass.
    start_sector: i32,
}

impl Session {
    pub fn new(session_type: SessionType) -> Session {
        Session {
            number: 0,
            session_type,
            tracks: Vec::new(),
            leadout_length: 0,
            mcn: None,
            languages: Vec::new(),
            raw_cdtext: None,
            start_sector: 0,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u8) {
        self.number = number;
    }

    pub(crate) fn set_start_sector(&mut self, start_sector: i32) {
        self.start_sector = start_sector;
    }

    pub fn start_sector(&self) -> Lba {
        Lba::from(self.start_sector)
    }

    pub fn add_track(&mut self, track: Track) -> &mut Track {
        self.tracks.push(track);
        // Just pushed, cannot be empty.
        self.tracks.last_mut().unwrap()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Track by position; -1 addresses the last track.
    pub fn track_by_index(&self, index: i32) -> Option<&Track> {
        if index == -1 {
            self.tracks.last()
        } else {
            self.tracks.get(index as usize)
        }
    }

    pub fn track_by_number(&self, number: u8) -> Option<&Track> {
        self.tracks.iter().find(|t| t.number() == number)
    }

    pub fn track_by_number_mut(&mut self, number: u8) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.number() == number)
    }

    pub fn last_track_mut(&mut self) -> Option<&mut Track> {
        self.tracks.last_mut()
    }

    /// Program-area length: the tracks without the lead-out gap.
    pub fn program_length(&self) -> i32 {
        self.tracks.iter().map(Track::length).sum()
    }

    /// Full session length including the lead-out gap.
    pub fn length(&self) -> i32 {
        self.program_length() + self.leadout_length
    }

    pub fn leadout_length(&self) -> i32 {
        self.leadout_length
    }

    pub fn set_leadout_length(&mut self, length: i32) {
        self.leadout_length = length;
    }

    pub fn leadout_start(&self) -> Lba {
        Lba::from(self.start_sector + self.program_length())
    }

    /// Where this session's lead-in would sit on a pressed disc.
    pub fn leadin_start(&self) -> Lba {
        Lba::from(self.start_sector - LEADIN_LENGTH)
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn add_language(&mut self, language: Language) -> &mut Language {
        self.languages.push(language);
        // Just pushed, cannot be empty.
        self.languages.last_mut().unwrap()
    }

    /// Raw CD-TEXT pack stream for this session: the verbatim blob when the
    /// image supplied one, otherwise packs encoded from the language data.
    pub fn cdtext_data(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw_cdtext {
            return raw.clone();
        }

        let mut blocks: Vec<Vec<PackData>> = Vec::new();
        for language in &self.languages {
            let mut entries: Vec<PackData> = Vec::new();

            for (pack_type, data) in language.iter() {
                entries.push(PackData {
                    track: 0,
                    pack_type,
                    data: data.to_vec(),
                });
            }

            for track in &self.tracks {
                for track_language in track.languages() {
                    if track_language.code != language.code {
                        continue;
                    }
                    for (pack_type, data) in track_language.iter() {
                        entries.push(PackData {
                            track: track.number(),
                            pack_type,
                            data: data.to_vec(),
                        });
                    }
                }
            }

            blocks.push(entries);
        }

        cdtext::encode(&blocks)
    }

    /// Install a verbatim pack stream (binary images carry CD-TEXT raw) and
    /// mirror what decodes cleanly into the language structures.
    pub fn set_cdtext_data(&mut self, raw: Vec<u8>) {
        for (block, entries) in cdtext::decode(&raw).into_iter().enumerate() {
            let mut language = Language::new(block as u16);
            let mut track_languages: Vec<(u8, Language)> = Vec::new();

            for entry in entries {
                if entry.track == 0 {
                    language.set_pack(entry.pack_type, entry.data);
                } else {
                    match track_languages.iter_mut().find(|(n, _)| *n == entry.track) {
                        Some((_, lang)) => lang.set_pack(entry.pack_type, entry.data),
                        None => {
                            let mut lang = Language::new(block as u16);
                            lang.set_pack(entry.pack_type, entry.data);
                            track_languages.push((entry.track, lang));
                        }
                    }
                }
            }

            self.languages.push(language);
            for (number, lang) in track_languages {
                if let Some(track) = self.track_by_number_mut(number) {
                    track.add_language(lang);
                }
            }
        }

        self.raw_cdtext = Some(raw);
    }
}
