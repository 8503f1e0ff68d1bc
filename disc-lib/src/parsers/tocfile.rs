//! Parser for cue-sheet-style text images (`.toc`).
//!
//! The format is line-oriented: session-level directives (session type,
//! CATALOG, CD_TEXT) followed by TRACK blocks whose directives attach
//! fragments, flags and indices to the current track. Parsing runs an
//! ordered list of (pattern, handler) rules against each line; the CD-TEXT
//! block is the one multi-line construct and is accumulated until its braces
//! balance, then handed to a sub-grammar.
//!
//! Multi-file images are one session per file; the inter-session gaps are
//! fixed by convention (11250 sectors before session 2, 6750 later).

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::addressing::Msf;
use crate::cdtext::{self, Language};
use crate::disc::{Disc, MediumType};
use crate::fragment::{Fragment, MainFormat, SharedStream, SubFormat};
use crate::parsers::{ImageParser, find_data_file};
use crate::sector::SectorType;
use crate::session::{FIRST_SESSION_GAP, LATER_SESSION_GAP, SessionType};
use crate::track::{Track, TrackFlags};
use crate::{DiscError, DiscResult};

pub struct TocFileParser;

const PACK_IDS: [(&str, u8); 12] = [
    ("TITLE", cdtext::PACK_TITLE),
    ("PERFORMER", cdtext::PACK_PERFORMER),
    ("SONGWRITER", cdtext::PACK_SONGWRITER),
    ("COMPOSER", cdtext::PACK_COMPOSER),
    ("ARRANGER", cdtext::PACK_ARRANGER),
    ("MESSAGE", cdtext::PACK_MESSAGE),
    ("DISC_ID", cdtext::PACK_DISC_ID),
    ("GENRE", cdtext::PACK_GENRE),
    ("TOC_INFO1", cdtext::PACK_TOC_INFO1),
    ("TOC_INFO2", cdtext::PACK_TOC_INFO2),
    ("UPC_EAN", cdtext::PACK_UPC_EAN),
    ("SIZE_INFO", cdtext::PACK_SIZE_INFO),
];

enum DataType {
    None,
    Audio,
    Data,
}

struct ParserState {
    disc: Disc,
    path: PathBuf,
    line: u32,
    /// Main/sub sector sizes of the current track, from its mode.
    cur_main_size: usize,
    cur_sub_size: usize,
    cur_sub_format: SubFormat,
    /// True once the current session has seen a TRACK directive; decides
    /// whether a CD-TEXT block is disc- or track-level.
    in_track: bool,
    lang_map: HashMap<u8, u16>,
    /// Running base offset for mixed-mode files without explicit #offset.
    mixed_mode_file: Option<PathBuf>,
    mixed_mode_offset: u64,
    streams: HashMap<PathBuf, SharedStream>,
}

type Handler = fn(&mut ParserState, &Captures) -> DiscResult<()>;

struct Rule {
    pattern: Regex,
    handler: Option<Handler>,
}

fn rules() -> Vec<Rule> {
    let rule = |pattern: &str, handler: Option<Handler>| Rule {
        // The patterns are literals; they compile.
        pattern: Regex::new(pattern).unwrap(),
        handler,
    };

    vec![
        rule(r"^\s*$", None),
        rule(r"^\s*//(?<comment>.+)$", Some(on_comment)),
        rule(
            r"^\s*(?<type>(CD_DA|CD_ROM_XA|CD_ROM|CD_I))",
            Some(on_session_type),
        ),
        rule(r#"^\s*CATALOG\s*"(?<catalog>\d{13})""#, Some(on_catalog)),
        rule(
            r"^\s*TRACK\s*(?<type>(AUDIO|MODE1_RAW|MODE1|MODE2_FORM1|MODE2_FORM2|MODE2_FORM_MIX|MODE2_RAW|MODE2))\s*(?<subchan>(RW_RAW|RW))?",
            Some(on_track),
        ),
        rule(r"^\s*(?<no>NO)?\s*COPY", Some(on_flag_copy)),
        rule(r"^\s*(?<no>NO)?\s*PRE_EMPHASIS", Some(on_flag_preemphasis)),
        rule(
            r"^\s*(?<num>(TWO|FOUR))_CHANNEL_AUDIO",
            Some(on_flag_channels),
        ),
        rule(
            r#"^\s*ISRC\s*"(?<isrc>[A-Z0-9]{5}[0-9]{7})""#,
            Some(on_isrc),
        ),
        rule(r"^\s*INDEX\s*(?<address>\d+:\d+:\d+)", Some(on_index)),
        rule(r"^\s*START\s*(?<address>\d+:\d+:\d+)?", Some(on_start)),
        rule(r"^\s*PREGAP\s*(?<length>\d+:\d+:\d+)", Some(on_pregap)),
        rule(r"^\s*ZERO\s*(?<length>\d+:\d+:\d+)", Some(on_zero)),
        rule(r"^\s*SILENCE\s*(?<length>\d+:\d+:\d+)", Some(on_silence)),
        rule(
            r#"^\s*(AUDIO)?FILE\s*"(?<filename>.+)"\s*(#(?<base_offset>\d+))?\s*((?<start>\d+:\d+:\d+)|(?<start_num>\d+))\s*(?<length>\d+:\d+:\d+)?"#,
            Some(on_audiofile),
        ),
        rule(
            r#"^\s*DATAFILE\s*"(?<filename>.+)"\s*(#(?<base_offset>\d+))?\s*(?<length>\d+:\d+:\d+)?"#,
            Some(on_datafile),
        ),
    ]
}

fn msf_str_to_sectors(state: &ParserState, text: &str) -> DiscResult<i32> {
    let mut parts = text.split(':');
    let mut next = || -> DiscResult<u8> {
        parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| state.error(format!("malformed MSF `{text}`")))
    };
    let (m, s, f) = (next()?, next()?, next()?);
    Ok(Msf::new(m, s, f).to_lba(false).raw())
}

impl ParserState {
    fn error(&self, desc: String) -> DiscError {
        DiscError::Parse {
            path: self.path.clone(),
            line: self.line,
            desc,
        }
    }

    fn cur_track(&mut self) -> DiscResult<&mut Track> {
        let line = self.line;
        let path = self.path.clone();
        self.disc
            .last_session_mut()
            .and_then(|s| s.last_track_mut())
            .ok_or(DiscError::Parse {
                path,
                line,
                desc: "directive outside of a TRACK block".to_string(),
            })
    }

    fn stream_for(&mut self, filename: &str) -> DiscResult<(PathBuf, SharedStream)> {
        let resolved = find_data_file(filename, &self.path)?;
        if let Some(stream) = self.streams.get(&resolved) {
            return Ok((resolved, Arc::clone(stream)));
        }
        let stream: SharedStream = Arc::new(File::open(&resolved)?);
        self.streams.insert(resolved.clone(), Arc::clone(&stream));
        Ok((resolved, stream))
    }

    /// Attach a fragment to the current track per the FILE/DATAFILE/gap
    /// directives. `start` and `length` are in sectors.
    fn add_fragment(
        &mut self,
        data_type: DataType,
        filename: Option<&str>,
        base_offset: Option<u64>,
        start: i32,
        length: i32,
    ) -> DiscResult<()> {
        let mut fragment = match (&data_type, filename) {
            (DataType::None, _) | (_, None) => Fragment::Null { len: length },
            (_, Some(filename)) => {
                let (resolved, stream) = self.stream_for(filename)?;
                let track_kind = self.cur_track()?.kind();

                let binary = matches!(data_type, DataType::Data)
                    || resolved
                        .extension()
                        .is_some_and(|e| e.eq_ignore_ascii_case("bin"));

                if binary {
                    // Raw audio in .bin files is stored big-endian and gets
                    // byte-swapped on read; a .bin listed as DATAFILE on an
                    // audio track (subchannel-carrying images) is the same.
                    let main_format = if track_kind == SectorType::Audio {
                        MainFormat::AudioByteSwapped
                    } else {
                        MainFormat::Data
                    };

                    let stride = (self.cur_main_size + self.cur_sub_size) as u64;

                    // Mixed-mode images share one data file across tracks and
                    // may omit the explicit #base_offset; keep a running
                    // offset keyed on the filename.
                    let base = match base_offset {
                        Some(offset) => offset,
                        None => {
                            if self.mixed_mode_file.as_deref() != Some(resolved.as_path()) {
                                self.mixed_mode_offset = 0;
                                self.mixed_mode_file = Some(resolved.clone());
                            }
                            let base = self.mixed_mode_offset;
                            if matches!(data_type, DataType::Data) {
                                self.mixed_mode_offset += length as u64 * stride;
                            }
                            base
                        }
                    };

                    Fragment::Binary {
                        stream,
                        main_offset: base + start as u64 * stride,
                        main_size: self.cur_main_size,
                        main_format,
                        sub_offset: 0,
                        sub_size: self.cur_sub_size,
                        sub_format: self.cur_sub_format,
                        len: length,
                    }
                } else {
                    Fragment::Audio {
                        stream,
                        byte_offset: base_offset.unwrap_or(0) + start as u64 * 2352,
                        len: length,
                    }
                }
            }
        };

        if length == 0 {
            fragment.use_rest_of_stream()?;
        }

        self.cur_track()?.add_fragment(fragment);
        Ok(())
    }
}

fn on_comment(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    debug!(line = state.line, comment = &caps["comment"], "comment");
    Ok(())
}

fn on_session_type(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let session_type = match &caps["type"] {
        "CD_DA" => SessionType::CdDa,
        "CD_ROM" => SessionType::CdRom,
        "CD_ROM_XA" => SessionType::CdRomXa,
        _ => SessionType::CdI,
    };
    if let Some(session) = state.disc.last_session_mut() {
        session.session_type = session_type;
    }
    Ok(())
}

fn on_catalog(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let catalog = caps["catalog"].to_string();
    if let Some(session) = state.disc.last_session_mut() {
        session.mcn = Some(catalog);
    }
    Ok(())
}

fn on_track(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let (kind, main_size) = match &caps["type"] {
        "AUDIO" => (SectorType::Audio, 2352),
        "MODE1" => (SectorType::Mode1, 2048),
        "MODE1_RAW" => (SectorType::Mode1, 2352),
        "MODE2" => (SectorType::Mode2Formless, 2336),
        "MODE2_FORM1" => (SectorType::Mode2Form1, 2048),
        "MODE2_FORM2" => (SectorType::Mode2Form2, 2324),
        "MODE2_FORM_MIX" => (SectorType::Mode2Mixed, 2336),
        _ => (SectorType::Mode2Mixed, 2352), // MODE2_RAW
    };

    let (sub_size, sub_format) = match caps.name("subchan").map(|m| m.as_str()) {
        Some("RW_RAW") => (96, SubFormat::PW96_INTERLEAVED | SubFormat::INTERNAL),
        Some("RW") => (96, SubFormat::RW96 | SubFormat::INTERNAL),
        _ => (0, SubFormat::empty()),
    };

    state.cur_main_size = main_size;
    state.cur_sub_size = sub_size;
    state.cur_sub_format = sub_format;
    state.in_track = true;

    state
        .disc
        .last_session_mut()
        .ok_or(DiscError::BadSession)?
        .add_track(Track::new(kind));
    Ok(())
}

fn on_flag_copy(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let permitted = caps.name("no").is_none();
    let track = state.cur_track()?;
    track.flags.set(TrackFlags::COPY_PERMITTED, permitted);
    Ok(())
}

fn on_flag_preemphasis(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let enabled = caps.name("no").is_none();
    let track = state.cur_track()?;
    track.flags.set(TrackFlags::PREEMPHASIS, enabled);
    Ok(())
}

fn on_flag_channels(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let four = &caps["num"] == "FOUR";
    let track = state.cur_track()?;
    track.flags.set(TrackFlags::FOUR_CHANNEL, four);
    Ok(())
}

fn on_isrc(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let isrc = caps["isrc"].to_string();
    state.cur_track()?.set_isrc(isrc);
    Ok(())
}

fn on_index(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    // INDEX addresses are relative to index 1, i.e. to track_start.
    let address = msf_str_to_sectors(state, &caps["address"])?;
    let track = state.cur_track()?;
    let track_start = track.track_start();
    track.add_index(track_start + address);
    Ok(())
}

fn on_start(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let address = match caps.name("address") {
        Some(m) => Some(msf_str_to_sectors(state, m.as_str())?),
        None => None,
    };
    let track = state.cur_track()?;
    let start = address.unwrap_or_else(|| track.length());
    track.set_track_start(start);
    Ok(())
}

fn on_pregap(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let length = msf_str_to_sectors(state, &caps["length"])?;
    state.add_fragment(DataType::None, None, None, 0, length)?;
    let track = state.cur_track()?;
    let start = track.length();
    track.set_track_start(start);
    Ok(())
}

fn on_zero(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let length = msf_str_to_sectors(state, &caps["length"])?;
    state.add_fragment(DataType::None, None, None, 0, length)
}

fn on_silence(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let length = msf_str_to_sectors(state, &caps["length"])?;
    state.add_fragment(DataType::None, None, None, 0, length)
}

fn on_audiofile(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let filename = caps["filename"].to_string();
    let base_offset = caps
        .name("base_offset")
        .and_then(|m| m.as_str().parse().ok());

    let start = match caps.name("start") {
        Some(m) => msf_str_to_sectors(state, m.as_str())?,
        None => caps
            .name("start_num")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0),
    };

    let length = match caps.name("length") {
        Some(m) => msf_str_to_sectors(state, m.as_str())?,
        None => 0,
    };

    state.add_fragment(DataType::Audio, Some(&filename), base_offset, start, length)
}

fn on_datafile(state: &mut ParserState, caps: &Captures) -> DiscResult<()> {
    let filename = caps["filename"].to_string();
    let base_offset = caps
        .name("base_offset")
        .and_then(|m| m.as_str().parse().ok());

    let length = match caps.name("length") {
        Some(m) => msf_str_to_sectors(state, m.as_str())?,
        None => 0,
    };

    state.add_fragment(DataType::Data, Some(&filename), base_offset, 0, length)
}

/// Span of the first brace-balanced block starting at the first `{` in
/// `text`, or None while braces remain open.
fn balanced_block(text: &str) -> Option<(usize, usize)> {
    let open = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((open, open + i));
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_language_body(body: &str, code: u16) -> Language {
    // PACK_TYPE "text" | PACK_TYPE { 1, 2, 3 }
    let langdata =
        Regex::new(r#"(?<type1>\w+)[ \t]*"(?<data1>[^"]*)"|(?<type2>\w+)[ \t]*\{(?<data2>[\d,\s]*)\}"#)
            .unwrap();

    let mut language = Language::new(code);

    for caps in langdata.captures_iter(body) {
        let (pack_id, data) = if let Some(kind) = caps.name("type1") {
            let mut bytes = caps["data1"].as_bytes().to_vec();
            bytes.push(0);
            (kind.as_str().to_string(), bytes)
        } else {
            let bytes = caps["data2"]
                .split(',')
                .filter_map(|n| n.trim().parse::<u8>().ok())
                .collect();
            (caps["type2"].to_string(), bytes)
        };

        if let Some(&(_, pack_type)) = PACK_IDS.iter().find(|(id, _)| *id == pack_id) {
            language.set_pack(pack_type, data);
        }
    }

    language
}

fn parse_cdtext_block(state: &mut ParserState, text: &str) -> DiscResult<()> {
    let langmap_re = Regex::new(r"LANGUAGE_MAP\s*\{(?<maps>[^}]*)\}").unwrap();
    let map_entry_re = Regex::new(r"(?<idx>\d+)[ \t]*:[ \t]*(?<code>\w+)").unwrap();
    let language_re = Regex::new(r"LANGUAGE\s*(?<idx>\d+)\s*\{").unwrap();

    if let Some(maps) = langmap_re.captures(text) {
        for entry in map_entry_re.captures_iter(&maps["maps"]) {
            let index: u8 = entry["idx"].parse().unwrap_or(0);
            let code = match &entry["code"] {
                "EN" => 9,
                other => other.parse().unwrap_or(0),
            };
            state.lang_map.insert(index, code);
        }
    }

    // Don't let LANGUAGE matching recurse into the language map.
    let search_from = langmap_re
        .find(text)
        .map(|m| m.end())
        .unwrap_or(0);

    let mut rest = &text[search_from..];
    while let Some(caps) = language_re.captures(rest) {
        let index: u8 = caps["idx"].parse().unwrap_or(0);
        let code = state.lang_map.get(&index).copied().unwrap_or(u16::from(index));

        let header = caps.get(0).unwrap();
        let Some((open, close)) = balanced_block(&rest[header.start()..]) else {
            return Err(state.error("unterminated LANGUAGE block".to_string()));
        };
        let body = &rest[header.start() + open + 1..header.start() + close];

        let language = parse_language_body(body, code);

        if state.in_track {
            state.cur_track()?.add_language(language);
        } else if let Some(session) = state.disc.last_session_mut() {
            session.add_language(language);
        }

        rest = &rest[header.start() + close + 1..];
    }

    Ok(())
}

fn parse_session_file(state: &mut ParserState, path: &Path) -> DiscResult<()> {
    let text = std::fs::read_to_string(path)?;

    state.path = path.to_path_buf();
    state.line = 0;
    state.in_track = false;
    state.lang_map.clear();
    state.mixed_mode_file = None;
    state.mixed_mode_offset = 0;

    let rules = rules();
    let cdtext_start = Regex::new(r"^\s*CD_TEXT\b").unwrap();

    let mut cdtext_buf: Option<String> = None;

    for line in text.lines() {
        state.line += 1;

        // Accumulate a CD-TEXT block until its braces balance.
        if let Some(buf) = &mut cdtext_buf {
            buf.push_str(line);
            buf.push('\n');
            if let Some(finished) = balanced_block(buf).map(|_| buf.clone()) {
                parse_cdtext_block(state, &finished)?;
                cdtext_buf = None;
            }
            continue;
        }

        let mut matched = false;
        for rule in &rules {
            if let Some(caps) = rule.pattern.captures(line) {
                if let Some(handler) = rule.handler {
                    handler(state, &caps)?;
                }
                matched = true;
                break;
            }
        }

        if !matched && cdtext_start.is_match(line) {
            let mut buf = line.to_string();
            buf.push('\n');
            if balanced_block(&buf).is_some() {
                parse_cdtext_block(state, &buf)?;
            } else {
                cdtext_buf = Some(buf);
            }
            matched = true;
        }

        if !matched {
            warn!(line = state.line, text = line, "unmatched directive");
        }
    }

    if cdtext_buf.is_some() {
        return Err(state.error("unterminated CD_TEXT block".to_string()));
    }

    Ok(())
}

/// The header directive must be present; X-CD-Roast also uses the `.toc`
/// suffix for a different format.
fn has_header(path: &Path) -> bool {
    let header = Regex::new(r"^\s*(CD_DA|CD_ROM_XA|CD_ROM|CD_I)").unwrap();
    match std::fs::read_to_string(path) {
        Ok(text) => text.lines().any(|l| header.is_match(l)),
        Err(_) => false,
    }
}

impl ImageParser for TocFileParser {
    fn name(&self) -> &'static str {
        "TOC-file"
    }

    fn can_handle(&self, filenames: &[PathBuf]) -> bool {
        !filenames.is_empty()
            && filenames.iter().all(|path| {
                path.extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("toc"))
                    && has_header(path)
            })
    }

    fn parse(&self, filenames: &[PathBuf]) -> DiscResult<Disc> {
        let mut state = ParserState {
            disc: Disc::new(MediumType::Cd),
            path: PathBuf::new(),
            line: 0,
            cur_main_size: 0,
            cur_sub_size: 0,
            cur_sub_format: SubFormat::empty(),
            in_track: false,
            lang_map: HashMap::new(),
            mixed_mode_file: None,
            mixed_mode_offset: 0,
            streams: HashMap::new(),
        };

        state.disc.set_filenames(filenames);
        // Text-format sessions address from sector 0; the implicit pregap
        // extends the layout rather than reaching into the lead-in.
        state.disc.set_layout_start(0);

        for (index, path) in filenames.iter().enumerate() {
            // Sessions in separate files all start at sector 0; the gap
            // between them is fixed by the multisession convention.
            if index > 0 {
                let gap = if index == 1 {
                    FIRST_SESSION_GAP
                } else {
                    LATER_SESSION_GAP
                };
                if let Some(previous) = state.disc.last_session_mut() {
                    previous.set_leadout_length(gap);
                }
            }

            state.disc.add_session(SessionType::CdDa);
            parse_session_file(&mut state, path)?;
        }

        let mut disc = state.disc;
        add_red_book_pregap(&mut disc);
        disc.relayout();
        Ok(disc)
    }
}

/// Prepend the implicit 150-sector Red Book pregap to track 1 of a CD.
fn add_red_book_pregap(disc: &mut Disc) {
    if disc.medium_type() != MediumType::Cd {
        return;
    }
    let Some(session) = disc.first_session_mut() else {
        return;
    };
    let Some(track) = session.tracks_mut().first_mut() else {
        return;
    };
    track.insert_fragment_front(Fragment::Null { len: 150 });
    let start = track.track_start();
    track.set_track_start(start + 150);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    struct TestDir(PathBuf);

    impl TestDir {
        fn new(name: &str) -> TestDir {
            let dir = std::env::temp_dir().join(format!("tocfile-{}-{}", name, std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            TestDir(dir)
        }

        fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.0.join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(contents).unwrap();
            path
        }
    }

    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = TestDir::new("probe");
        let other = dir.write("image.toc", b"not a session header\n");
        assert!(!TocFileParser.can_handle(&[other]));
    }

    #[test]
    fn parses_audio_session() {
        let dir = TestDir::new("audio");
        // Two tracks: 4 sectors and 2 sectors of raw big-endian audio.
        dir.write("audio.bin", &vec![0u8; 6 * 2352]);
        let toc = dir.write(
            "audio.toc",
            br#"CD_DA

TRACK AUDIO
NO COPY
FILE "audio.bin" 0 00:00:04

TRACK AUDIO
FILE "audio.bin" #28224 0 00:00:02
"#,
        );

        let disc = TocFileParser.parse(&[toc]).unwrap();
        assert_eq!(disc.sessions().len(), 1);
        assert_eq!(disc.num_tracks(), 2);

        let (_, track1) = disc.track_by_number(1).unwrap();
        // Implicit Red Book pregap.
        assert_eq!(track1.track_start(), 150);
        assert_eq!(track1.length(), 154);

        let (_, track2) = disc.track_by_number(2).unwrap();
        assert_eq!(track2.length(), 2);
        assert_eq!(track2.start_sector().raw(), 154);
    }

    #[test]
    fn pregap_and_start() {
        let dir = TestDir::new("pregap");
        dir.write("data.bin", &vec![0u8; 10 * 2048]);
        let toc = dir.write(
            "data.toc",
            br#"CD_ROM
TRACK MODE1
PREGAP 00:00:10
DATAFILE "data.bin" 00:00:10
"#,
        );

        let disc = TocFileParser.parse(&[toc]).unwrap();
        let (_, track) = disc.track_by_number(1).unwrap();
        // 150 implicit + 10 explicit pregap.
        assert_eq!(track.track_start(), 160);
        assert_eq!(track.length(), 170);
    }

    #[test]
    fn multi_file_images_become_sessions() {
        let dir = TestDir::new("multi");
        dir.write("s1.bin", &vec![0u8; 4 * 2352]);
        dir.write("s2.bin", &vec![0u8; 4 * 2048]);
        let toc1 = dir.write("s1.toc", b"CD_DA\nTRACK AUDIO\nFILE \"s1.bin\" 0\n");
        let toc2 = dir.write("s2.toc", b"CD_ROM\nTRACK MODE1\nDATAFILE \"s2.bin\"\n");

        let disc = TocFileParser.parse(&[toc1, toc2]).unwrap();
        assert_eq!(disc.sessions().len(), 2);
        assert_eq!(disc.sessions()[0].leadout_length(), FIRST_SESSION_GAP);
        assert_eq!(disc.sessions()[1].session_type, SessionType::CdRom);
        assert_eq!(disc.track_by_number(2).unwrap().1.kind(), SectorType::Mode1);
    }

    #[test]
    fn mixed_mode_running_offset() {
        let dir = TestDir::new("mixed");
        dir.write("mm.bin", &vec![0u8; 20 * (2048 + 96)]);
        let toc = dir.write(
            "mm.toc",
            br#"CD_ROM
TRACK MODE1 RW_RAW
DATAFILE "mm.bin" 00:00:10
TRACK MODE1 RW_RAW
DATAFILE "mm.bin" 00:00:10
"#,
        );

        let disc = TocFileParser.parse(&[toc]).unwrap();
        let (_, track2) = disc.track_by_number(2).unwrap();
        let Fragment::Binary { main_offset, .. } = &track2.fragments()[0] else {
            panic!("expected binary fragment");
        };
        assert_eq!(*main_offset, 10 * (2048 + 96) as u64);
    }

    #[test]
    fn cdtext_block() {
        let dir = TestDir::new("cdtext");
        dir.write("cd.bin", &vec![0u8; 2 * 2352]);
        let toc = dir.write(
            "cd.toc",
            br#"CD_DA
CD_TEXT {
  LANGUAGE_MAP {
    0 : EN
  }
  LANGUAGE 0 {
    TITLE "THE ALBUM"
    PERFORMER "THE BAND"
  }
}
TRACK AUDIO
CD_TEXT {
  LANGUAGE 0 {
    TITLE "THE SONG"
  }
}
FILE "cd.bin" 0
"#,
        );

        let disc = TocFileParser.parse(&[toc]).unwrap();
        let session = &disc.sessions()[0];
        assert_eq!(session.languages().len(), 1);
        assert_eq!(session.languages()[0].code, 9);
        assert_eq!(
            session.languages()[0].pack(cdtext::PACK_TITLE),
            Some(&b"THE ALBUM\0"[..])
        );

        let (_, track) = disc.track_by_number(1).unwrap();
        assert_eq!(
            track.languages()[0].pack(cdtext::PACK_TITLE),
            Some(&b"THE SONG\0"[..])
        );

        // Whole-session pack stream contains both entities.
        assert!(!session.cdtext_data().is_empty());
    }

    #[test]
    fn missing_data_file_reported() {
        let dir = TestDir::new("missing");
        let toc = dir.write("bad.toc", b"CD_DA\nTRACK AUDIO\nFILE \"gone.bin\" 0\n");
        assert!(matches!(
            TocFileParser.parse(&[toc]),
            Err(DiscError::DataFileMissing(_))
        ));
    }
}
