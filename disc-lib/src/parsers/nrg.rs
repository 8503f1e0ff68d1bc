//! Parser for binary-trailer images (`.nrg`).
//!
//! The image is raw sector data followed by a typed-block trailer. The last
//! 12 bytes locate the trailer: `NER5` at EOF-12 puts a big-endian u64
//! trailer offset at EOF-8 (new format); otherwise `NERO` at EOF-8 puts a
//! big-endian u32 offset at EOF-4 (old format, 32-bit file offsets and MSF
//! addresses throughout).
//!
//! The trailer is a sequence of TLV blocks (4-byte ASCII id, u32 length,
//! payload). Sessions are reconstructed by pairing the nth CUE block with
//! the nth DAO block (disc-at-once) or from the nth ETN block
//! (track-at-once).

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::addressing::Msf;
use crate::bcd::{bcd_to_hex, is_valid_bcd};
use crate::disc::{Disc, MediumType};
use crate::dpm::DpmData;
use crate::fragment::{BlobStream, Fragment, MainFormat, SharedStream, SubFormat};
use crate::parsers::{ImageParser, decode_mode_code};
use crate::sector::SectorType;
use crate::session::SessionType;
use crate::track::{TRACK_LEADOUT, Track, TrackFlags};
use crate::{DiscError, DiscResult};

pub struct NrgParser;

/// Block ids carrying fixed-size sub-blocks: (id, sub-block offset within
/// payload, sub-block length).
const BLOCK_IDS: [(&[u8; 4], usize, usize); 10] = [
    (b"CUEX", 0, 8),
    (b"CUES", 0, 8),
    (b"ETN2", 0, 32),
    (b"ETNF", 0, 20),
    (b"DAOX", 22, 42),
    (b"DAOI", 22, 30),
    (b"CDTX", 0, 0),
    (b"SINF", 0, 0),
    (b"MTYP", 0, 0),
    (b"END!", 0, 0),
];

/// Medium-type equivalence masks derived from the writer's media flags.
const MEDIA_CD_EQUIV: u32 = 0x0000_0401;
const MEDIA_DVD_EQUIV: u32 = 0x000C_021C;
const MEDIA_BD_EQUIV: u32 = 0x0070_0000;
const MEDIA_HD_EQUIV: u32 = 0x0380_0000;

struct BlockEntry {
    id: [u8; 4],
    /// Payload offset within the trailer data.
    offset: usize,
    length: usize,
    subblocks_offset: usize,
    subblock_len: usize,
    num_subblocks: usize,
}

struct Trailer {
    old_format: bool,
    data: Vec<u8>,
}

struct CueEntry {
    adr_ctl: u8,
    track: u8,
    index: u8,
    start_sector: i32,
}

struct DaoHeader {
    mcn: Option<String>,
}

struct DaoEntry {
    isrc: Option<String>,
    sector_size: usize,
    mode_code: u8,
    pregap_offset: u64,
    start_offset: u64,
    end_offset: u64,
}

struct EtnEntry {
    offset: u64,
    size: u64,
    mode: u8,
}

fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn be_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(bytes)
}

fn parse_error(path: &Path, desc: impl Into<String>) -> DiscError {
    DiscError::Parse {
        path: path.to_path_buf(),
        line: 0,
        desc: desc.into(),
    }
}

/// Probe the trailing signature. `Ok(None)` means "not this format".
fn probe(path: &Path) -> DiscResult<Option<(bool, u64)>> {
    let file = File::open(path)?;
    let size = file.size()?;
    if size < 12 {
        return Ok(None);
    }

    let mut tail = [0u8; 12];
    BlobStream::read_exact_at(&file, size - 12, &mut tail)?;

    if &tail[0..4] == b"NER5" {
        let offset = u64::from_be_bytes(tail[4..12].try_into().unwrap());
        if offset < size - 12 {
            return Ok(Some((false, offset)));
        }
    } else if &tail[4..8] == b"NERO" {
        let offset = u64::from(be_u32(&tail, 8));
        if offset < size - 8 {
            return Ok(Some((true, offset)));
        }
    }

    Ok(None)
}

fn read_trailer(path: &Path) -> DiscResult<Option<Trailer>> {
    let Some((old_format, offset)) = probe(path)? else {
        return Ok(None);
    };

    let file = File::open(path)?;
    let size = file.size()?;
    let tail_len = if old_format { 8 } else { 12 };
    let data_len = (size - tail_len - offset) as usize;

    let mut data = vec![0u8; data_len];
    BlobStream::read_exact_at(&file, offset, &mut data)?;

    Ok(Some(Trailer { old_format, data }))
}

fn build_block_index(path: &Path, data: &[u8]) -> DiscResult<Vec<BlockEntry>> {
    let mut index = Vec::new();
    let mut pos = 0usize;

    while pos + 8 <= data.len() {
        let mut id = [0u8; 4];
        id.copy_from_slice(&data[pos..pos + 4]);
        let length = be_u32(data, pos + 4) as usize;

        if pos + 8 + length > data.len() {
            return Err(parse_error(
                path,
                format!("block {} overruns trailer", String::from_utf8_lossy(&id)),
            ));
        }

        let (subblocks_offset, subblock_len) = BLOCK_IDS
            .iter()
            .find(|(known, _, _)| **known == id)
            .map(|&(_, off, len)| (off, len))
            .unwrap_or((0, 0));

        let num_subblocks = if subblock_len > 0 {
            (length - subblocks_offset) / subblock_len
        } else {
            0
        };

        debug!(
            id = %String::from_utf8_lossy(&id),
            offset = pos,
            length,
            num_subblocks,
            "trailer block"
        );

        index.push(BlockEntry {
            id,
            offset: pos + 8,
            length,
            subblocks_offset,
            subblock_len,
            num_subblocks,
        });

        pos += 8 + length;
    }

    Ok(index)
}

fn find_block<'a>(
    index: &'a [BlockEntry],
    id: &[u8; 4],
    ordinal: usize,
) -> Option<&'a BlockEntry> {
    index.iter().filter(|e| &e.id == id).nth(ordinal)
}

fn ascii_field(bytes: &[u8]) -> Option<String> {
    let text: String = bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_alphanumeric()) {
        None
    } else {
        Some(text)
    }
}

fn load_cue_entries(trailer: &Trailer, block: &BlockEntry) -> Vec<CueEntry> {
    let mut entries = Vec::with_capacity(block.num_subblocks);
    let data = &trailer.data;

    for i in 0..block.num_subblocks {
        let at = block.offset + i * block.subblock_len;

        let raw_track = data[at + 1];
        // Track numbers are BCD; the lead-in (0x00) and lead-out (0xAA)
        // markers pass through untouched.
        let track = if raw_track == 0 || raw_track == TRACK_LEADOUT || !is_valid_bcd(raw_track) {
            raw_track
        } else {
            bcd_to_hex(raw_track)
        };

        let start_sector = if trailer.old_format {
            let msf = Msf::new(data[at + 5], data[at + 6], data[at + 7]);
            msf.to_lba(true).raw()
        } else {
            be_u32(data, at + 4) as i32
        };

        entries.push(CueEntry {
            adr_ctl: data[at],
            track,
            index: bcd_to_hex(data[at + 2]),
            start_sector,
        });
    }

    entries
}

fn load_dao_data(trailer: &Trailer, block: &BlockEntry) -> (DaoHeader, Vec<DaoEntry>) {
    let data = &trailer.data;
    let header = DaoHeader {
        mcn: ascii_field(&data[block.offset + 4..block.offset + 17]),
    };

    let mut entries = Vec::with_capacity(block.num_subblocks);
    for i in 0..block.num_subblocks {
        let at = block.offset + block.subblocks_offset + i * block.subblock_len;

        let isrc = ascii_field(&data[at..at + 12]);
        let sector_size = be_u16(data, at + 12) as usize;
        let mode_code = data[at + 14];

        let (pregap_offset, start_offset, end_offset) = if trailer.old_format {
            (
                u64::from(be_u32(data, at + 18)),
                u64::from(be_u32(data, at + 22)),
                u64::from(be_u32(data, at + 26)),
            )
        } else {
            (
                be_u64(data, at + 18),
                be_u64(data, at + 26),
                be_u64(data, at + 34),
            )
        };

        entries.push(DaoEntry {
            isrc,
            sector_size,
            mode_code,
            pregap_offset,
            start_offset,
            end_offset,
        });
    }

    (header, entries)
}

fn load_etn_entries(trailer: &Trailer, block: &BlockEntry) -> Vec<EtnEntry> {
    let data = &trailer.data;
    let mut entries = Vec::with_capacity(block.num_subblocks);

    for i in 0..block.num_subblocks {
        let at = block.offset + i * block.subblock_len;
        let entry = if trailer.old_format {
            EtnEntry {
                offset: u64::from(be_u32(data, at)),
                size: u64::from(be_u32(data, at + 4)),
                mode: data[at + 11],
            }
        } else {
            EtnEntry {
                offset: be_u64(data, at),
                size: be_u64(data, at + 8),
                mode: data[at + 19],
            }
        };
        entries.push(entry);
    }

    entries
}

/// Session type inferred from the track modes it holds.
fn session_type_for(tracks: &[Track]) -> SessionType {
    if tracks.iter().all(|t| t.kind() == SectorType::Audio) {
        SessionType::CdDa
    } else if tracks.iter().any(|t| t.kind().is_mode2()) {
        SessionType::CdRomXa
    } else {
        SessionType::CdRom
    }
}

struct NrgLoader {
    path: PathBuf,
    stream: SharedStream,
    prev_session_end: i32,
}

impl NrgLoader {
    fn decode_mode(
        &self,
        mode_code: u8,
        sector_size: usize,
    ) -> DiscResult<(SectorType, usize, usize)> {
        let (kind, mut main_size, sub_size) = decode_mode_code(mode_code)
            .ok_or_else(|| parse_error(&self.path, format!("unknown mode code {mode_code:#04X}")))?;

        // Some codes (0x02/0xAA) occur with either 2048 or 2352 byte main
        // channels; trust the recorded sector size when it disagrees.
        if sector_size != 0 && main_size + sub_size != sector_size && sector_size > sub_size {
            warn!(
                mode_code,
                expected = main_size + sub_size,
                actual = sector_size,
                "sector size mismatch"
            );
            main_size = sector_size - sub_size;
        }

        Ok((kind, main_size, sub_size))
    }

    fn binary_fragment(
        &self,
        kind: SectorType,
        main_size: usize,
        sub_size: usize,
        offset: u64,
        len: i32,
    ) -> Fragment {
        let main_format = if kind == SectorType::Audio {
            MainFormat::Audio
        } else {
            MainFormat::Data
        };
        let sub_format = if sub_size > 0 {
            SubFormat::PW96_INTERLEAVED | SubFormat::INTERNAL
        } else {
            SubFormat::empty()
        };

        Fragment::Binary {
            stream: Arc::clone(&self.stream),
            main_offset: offset,
            main_size,
            main_format,
            sub_offset: 0,
            sub_size,
            sub_format,
            len,
        }
    }

    /// Disc-at-once session: DAO blocks build the tracks, CUE blocks place
    /// pregaps and indices.
    fn load_dao_session(
        &mut self,
        disc: &mut Disc,
        cue_entries: &[CueEntry],
        dao_header: DaoHeader,
        dao_entries: &[DaoEntry],
    ) -> DiscResult<()> {
        let mut tracks = Vec::new();

        for dao in dao_entries {
            let (kind, main_size, sub_size) = self.decode_mode(dao.mode_code, dao.sector_size)?;
            let mut track = Track::new(kind);

            let stride = (main_size + sub_size) as u64;
            let pregap_len = ((dao.start_offset - dao.pregap_offset) / stride) as i32;
            if pregap_len > 0 {
                track.add_fragment(self.binary_fragment(
                    kind,
                    main_size,
                    sub_size,
                    dao.pregap_offset,
                    pregap_len,
                ));
            }

            let data_len = ((dao.end_offset - dao.start_offset) / stride) as i32;
            if data_len > 0 {
                track.add_fragment(self.binary_fragment(
                    kind,
                    main_size,
                    sub_size,
                    dao.start_offset,
                    data_len,
                ));
            }

            if let Some(isrc) = &dao.isrc {
                track.set_isrc(isrc.clone());
            }

            tracks.push(track);
        }

        let session_type = session_type_for(&tracks);
        let session = disc.add_session(session_type);
        session.mcn = dao_header.mcn;
        for track in tracks {
            session.add_track(track);
        }

        // Track numbers must exist before CUE entries can address them.
        disc.relayout();

        let first_session = disc.sessions().len() == 1;
        let mut track_begin: HashMap<u8, i32> = HashMap::new();

        for cue in cue_entries {
            if cue.track == 0 && cue.index == 0 {
                if first_session {
                    // The first session's lead-in block fixes the layout
                    // start (usually -150).
                    disc.set_layout_start(cue.start_sector);
                } else {
                    // Later lead-ins close the previous session: its
                    // lead-out spans up to this session's start.
                    let gap = cue.start_sector - self.prev_session_end;
                    if let Some(previous) = disc.session_by_index_mut(-2) {
                        previous.set_leadout_length(gap);
                    }
                }
            } else if cue.track == TRACK_LEADOUT {
                self.prev_session_end = cue.start_sector;
            } else if cue.index == 0 {
                track_begin.insert(cue.track, cue.start_sector);
            } else {
                let session = disc.last_session_mut().ok_or(DiscError::BadSession)?;
                let Some(track) = session.track_by_number_mut(cue.track) else {
                    warn!(track = cue.track, "CUE entry for unknown track");
                    continue;
                };
                let begin = track_begin
                    .get(&cue.track)
                    .copied()
                    .unwrap_or(cue.start_sector);
                let address = cue.start_sector - begin;
                if cue.index == 1 {
                    track.set_track_start(address);
                    // CTL nibble from the Q entry carries the track flags.
                    track.flags = TrackFlags::from_bits_truncate(cue.adr_ctl >> 4);
                } else {
                    track.add_index(address);
                }
            }
        }

        disc.relayout();
        Ok(())
    }

    /// Track-at-once session: each ETN entry is one track with a synthetic
    /// 150-sector pregap.
    fn load_tao_session(&mut self, disc: &mut Disc, etn_entries: &[EtnEntry]) -> DiscResult<()> {
        let mut tracks = Vec::new();

        for etn in etn_entries {
            let (kind, main_size, sub_size) = self.decode_mode(etn.mode, 0)?;
            let mut track = Track::new(kind);

            track.add_fragment(Fragment::Null { len: 150 });
            track.set_track_start(150);

            let data_len = (etn.size / (main_size + sub_size) as u64) as i32;
            if data_len > 0 {
                track.add_fragment(self.binary_fragment(
                    kind,
                    main_size,
                    sub_size,
                    etn.offset,
                    data_len,
                ));
            }

            tracks.push(track);
        }

        let session_type = session_type_for(&tracks);
        let session = disc.add_session(session_type);
        for track in tracks {
            session.add_track(track);
        }

        disc.relayout();
        Ok(())
    }
}

fn load_medium_type(path: &Path, data: &[u8], block: &BlockEntry) -> DiscResult<MediumType> {
    if block.length < 4 {
        return Err(parse_error(path, "truncated MTYP block"));
    }
    let mtyp = be_u32(data, block.offset);

    if mtyp & MEDIA_CD_EQUIV != 0 {
        Ok(MediumType::Cd)
    } else if mtyp & MEDIA_DVD_EQUIV != 0 {
        Ok(MediumType::Dvd)
    } else if mtyp & MEDIA_BD_EQUIV != 0 {
        Ok(MediumType::Bd)
    } else if mtyp & MEDIA_HD_EQUIV != 0 {
        Ok(MediumType::Hd)
    } else {
        Err(parse_error(path, format!("unhandled medium type {mtyp:#X}")))
    }
}

/// The trailer format carries no DVD structures, but hosts expect at least
/// the physical format information and copyright structures on a DVD-ROM;
/// fabricate plausible ones around the image layout.
fn synthesize_dvd_structures(disc: &mut Disc) {
    const PHYSICAL_INFO: (u8, u8) = (0, 0x00);
    const COPYRIGHT_INFO: (u8, u8) = (0, 0x01);

    if disc.structure(PHYSICAL_INFO.0, PHYSICAL_INFO.1).is_none() {
        let mut physical = vec![0u8; 2048];
        physical[0] = 0x01; // DVD-ROM, part version 1
        physical[1] = 0x02; // 120 mm, 10.08 Mbit/s
        physical[2] = 0x01; // one layer, embossed
        physical[3] = 0x10; // 0.74 um track pitch

        // Data zone: physical sectors start at 0x30000.
        let start_psn: u32 = 0x30000;
        let end_psn = start_psn + disc.layout_length().max(0) as u32;
        physical[4..8].copy_from_slice(&start_psn.to_be_bytes());
        physical[8..12].copy_from_slice(&end_psn.to_be_bytes());

        disc.set_structure(PHYSICAL_INFO.0, PHYSICAL_INFO.1, physical);
    }

    if disc.structure(COPYRIGHT_INFO.0, COPYRIGHT_INFO.1).is_none() {
        // No protection system, all regions allowed.
        disc.set_structure(COPYRIGHT_INFO.0, COPYRIGHT_INFO.1, vec![0x00, 0x00, 0x00, 0x00]);
    }
}

fn load_dpm(data: &[u8], block: &BlockEntry) -> Option<DpmData> {
    if block.length < 16 {
        return None;
    }
    let start_sector = be_u32(data, block.offset + 4) as i32;
    let resolution = be_u32(data, block.offset + 8) as i32;
    let num_entries = be_u32(data, block.offset + 12) as usize;

    if block.length < 16 + num_entries * 4 {
        return None;
    }

    let entries = (0..num_entries)
        .map(|i| be_u32(data, block.offset + 16 + i * 4))
        .collect();

    Some(DpmData {
        start_sector,
        resolution,
        entries,
    })
}

impl ImageParser for NrgParser {
    fn name(&self) -> &'static str {
        "NRG-trailer"
    }

    fn can_handle(&self, filenames: &[PathBuf]) -> bool {
        filenames.len() == 1 && matches!(probe(&filenames[0]), Ok(Some(_)))
    }

    fn parse(&self, filenames: &[PathBuf]) -> DiscResult<Disc> {
        let path = &filenames[0];
        let trailer = read_trailer(path)?
            .ok_or_else(|| DiscError::CannotHandle(path.clone()))?;

        let index = build_block_index(path, &trailer.data)?;

        let mut disc = Disc::new(MediumType::Cd);
        disc.set_filenames(filenames);

        let mut loader = NrgLoader {
            path: path.clone(),
            stream: Arc::new(File::open(path)?),
            prev_session_end: 0,
        };

        let (cue_id, etn_id): (&[u8; 4], &[u8; 4]) = if trailer.old_format {
            (b"CUES", b"ETNF")
        } else {
            (b"CUEX", b"ETN2")
        };
        let dao_id: &[u8; 4] = if trailer.old_format { b"DAOI" } else { b"DAOX" };

        // One session per CUE/DAO (or ETN) block pair, matched by ordinal.
        for session_num in 0.. {
            if let Some(cue_block) = find_block(&index, cue_id, session_num) {
                let dao_block = find_block(&index, dao_id, session_num).ok_or_else(|| {
                    parse_error(path, format!("session {session_num} has no DAO block"))
                })?;

                let cue_entries = load_cue_entries(&trailer, cue_block);
                let (dao_header, dao_entries) = load_dao_data(&trailer, dao_block);
                loader.load_dao_session(&mut disc, &cue_entries, dao_header, &dao_entries)?;
            } else if let Some(etn_block) = find_block(&index, etn_id, session_num) {
                let etn_entries = load_etn_entries(&trailer, etn_block);
                loader.load_tao_session(&mut disc, &etn_entries)?;
            } else {
                debug!(sessions = session_num, "all sessions loaded");
                break;
            }
        }

        if disc.sessions().is_empty() {
            return Err(parse_error(path, "no sessions in trailer"));
        }

        if let Some(cdtx) = find_block(&index, b"CDTX", 0) {
            let raw = trailer.data[cdtx.offset..cdtx.offset + cdtx.length].to_vec();
            if let Some(session) = disc.first_session_mut() {
                session.set_cdtext_data(raw);
            }
        }

        if let Some(sinf) = find_block(&index, b"SINF", 0) {
            if sinf.length >= 4 {
                let tracks = be_u32(&trailer.data, sinf.offset);
                debug!(tracks, "session information block");
            }
        }

        if let Some(mtyp) = find_block(&index, b"MTYP", 0) {
            let medium = load_medium_type(path, &trailer.data, mtyp)?;
            disc.set_medium_type(medium);
        }

        if disc.medium_type() == MediumType::Dvd {
            synthesize_dvd_structures(&mut disc);
        }

        if let Some(dpmb) = find_block(&index, b"DPMB", 0) {
            if let Some(dpm) = load_dpm(&trailer.data, dpmb) {
                disc.set_dpm(dpm);
            }
        }

        disc.relayout();
        Ok(disc)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("nrg-{}-{}", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    fn block(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(id);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn cue_entry(adr_ctl: u8, track_bcd: u8, index_bcd: u8, start: i32) -> Vec<u8> {
        let mut out = vec![adr_ctl, track_bcd, index_bcd, 0];
        out.extend_from_slice(&start.to_be_bytes());
        out
    }

    fn dao_block_new(entries: &[(u8, u16, u64, u64, u64)]) -> Vec<u8> {
        // 22-byte header: dummy u32, MCN (13, zeroed), flags, track range.
        let mut payload = vec![0u8; 22];
        for &(mode_code, sector_size, pregap, start, end) in entries {
            let mut sub = vec![0u8; 12]; // ISRC
            sub.extend_from_slice(&sector_size.to_be_bytes());
            sub.push(mode_code);
            sub.push(0);
            sub.extend_from_slice(&[0, 0]);
            sub.extend_from_slice(&pregap.to_be_bytes());
            sub.extend_from_slice(&start.to_be_bytes());
            sub.extend_from_slice(&end.to_be_bytes());
            payload.extend_from_slice(&sub);
        }
        block(b"DAOX", &payload)
    }

    /// One Mode 1 track: 150-sector pregap and 10 data sectors, new format.
    fn sample_image(name: &str) -> PathBuf {
        let sector_size = 2048u64;
        let data_area = vec![0u8; (160 * sector_size) as usize];

        let mut trailer = Vec::new();
        let mut cue = Vec::new();
        cue.extend(cue_entry(0x41, 0x00, 0x00, -150));
        cue.extend(cue_entry(0x41, 0x01, 0x00, -150));
        cue.extend(cue_entry(0x41, 0x01, 0x01, 0));
        cue.extend(cue_entry(0x41, 0xAA, 0x01, 10));
        trailer.extend(block(b"CUEX", &cue));
        trailer.extend(dao_block_new(&[(
            0x02,
            2048,
            0,
            150 * sector_size,
            160 * sector_size,
        )]));
        trailer.extend(block(b"MTYP", &0x0401u32.to_be_bytes()));
        trailer.extend(block(b"END!", &[]));

        let trailer_offset = data_area.len() as u64;

        let mut image = data_area;
        image.extend_from_slice(&trailer);
        image.extend_from_slice(b"NER5");
        image.extend_from_slice(&trailer_offset.to_be_bytes());

        write_temp(name, &image)
    }

    #[test]
    fn probe_rejects_garbage() {
        let path = write_temp("garbage", b"definitely not an image trailer here");
        assert!(!NrgParser.can_handle(&[path.clone()]));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn parses_single_session_dao() {
        let path = sample_image("dao");
        let disc = NrgParser.parse(&[path.clone()]).unwrap();

        assert_eq!(disc.medium_type(), MediumType::Cd);
        assert_eq!(disc.sessions().len(), 1);
        assert_eq!(disc.layout_start().raw(), -150);

        let (session, track) = disc.track_by_number(1).unwrap();
        assert_eq!(track.kind(), SectorType::Mode1);
        assert_eq!(track.start_sector().raw(), -150);
        assert_eq!(track.track_start(), 150);
        assert_eq!(track.length(), 160);
        assert_eq!(session.leadout_start().raw(), 10);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn sector_read_through_fragments() {
        let path = sample_image("read");
        let disc = NrgParser.parse(&[path.clone()]).unwrap();

        let sector = disc.get_sector(crate::Lba::from(0)).unwrap();
        assert_eq!(sector.kind(), SectorType::Mode1);
        // Data came from offset 150 * 2048 in the file (all zeros).
        assert!(sector.data().iter().all(|&b| b == 0));
        assert!(sector.verify_edc());

        let _ = std::fs::remove_file(path);
    }

    /// Two DAO sessions; the second session's lead-in entry closes the
    /// first session's lead-out.
    fn multisession_image(name: &str) -> PathBuf {
        let data_area = vec![0u8; 300 * 2352 + 100 * 2048];

        let mut trailer = Vec::new();

        // Session 1: audio, 150-sector pregap + 150 sectors.
        let mut cue = Vec::new();
        cue.extend(cue_entry(0x01, 0x00, 0x00, -150));
        cue.extend(cue_entry(0x01, 0x01, 0x00, -150));
        cue.extend(cue_entry(0x01, 0x01, 0x01, 0));
        cue.extend(cue_entry(0x01, 0xAA, 0x01, 150));
        trailer.extend(block(b"CUEX", &cue));
        trailer.extend(dao_block_new(&[(0x07, 2352, 0, 150 * 2352, 300 * 2352)]));

        // Session 2: data, starting a full 11250-sector gap (previous
        // lead-out plus this session's lead-in) after session 1.
        let mut cue = Vec::new();
        cue.extend(cue_entry(0x41, 0x00, 0x00, 150 + 11250));
        cue.extend(cue_entry(0x41, 0x02, 0x01, 150 + 11250));
        cue.extend(cue_entry(0x41, 0xAA, 0x01, 150 + 11250 + 100));
        trailer.extend(block(b"CUEX", &cue));
        trailer.extend(dao_block_new(&[(
            0x02,
            2048,
            300 * 2352,
            300 * 2352,
            300 * 2352 + 100 * 2048,
        )]));

        trailer.extend(block(b"END!", &[]));

        let trailer_offset = data_area.len() as u64;
        let mut image = data_area;
        image.extend_from_slice(&trailer);
        image.extend_from_slice(b"NER5");
        image.extend_from_slice(&trailer_offset.to_be_bytes());

        write_temp(name, &image)
    }

    #[test]
    fn parses_multisession_dao() {
        let path = multisession_image("multi");
        let disc = NrgParser.parse(&[path.clone()]).unwrap();

        assert_eq!(disc.sessions().len(), 2);

        let session1 = &disc.sessions()[0];
        assert_eq!(session1.session_type, SessionType::CdDa);
        assert_eq!(session1.leadout_start().raw(), 150);
        // The whole inter-session gap folds into the lead-out length.
        assert_eq!(session1.leadout_length(), 11250);

        let (session2, track2) = disc.track_by_number(2).unwrap();
        assert_eq!(session2.number(), 2);
        assert_eq!(track2.kind(), SectorType::Mode1);
        assert_eq!(track2.start_sector().raw(), 150 + 11250);

        // A sector in the gap resolves to a lead-out pseudo-track sector.
        let gap = disc.get_sector(crate::Lba::from(200)).unwrap();
        assert_eq!(gap.subchannel_q()[1], 0xAA);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn dvd_image_gets_synthesized_structures() {
        let sector_size = 2048u64;
        let data_area = vec![0u8; (100 * sector_size) as usize];

        let mut trailer = Vec::new();
        let mut cue = Vec::new();
        cue.extend(cue_entry(0x41, 0x00, 0x00, 0));
        cue.extend(cue_entry(0x41, 0x01, 0x01, 0));
        cue.extend(cue_entry(0x41, 0xAA, 0x01, 100));
        trailer.extend(block(b"CUEX", &cue));
        trailer.extend(dao_block_new(&[(0x02, 2048, 0, 0, 100 * sector_size)]));
        trailer.extend(block(b"MTYP", &0x0200u32.to_be_bytes())); // DVD-ROM
        trailer.extend(block(b"END!", &[]));

        let trailer_offset = data_area.len() as u64;
        let mut image = data_area;
        image.extend_from_slice(&trailer);
        image.extend_from_slice(b"NER5");
        image.extend_from_slice(&trailer_offset.to_be_bytes());

        let path = write_temp("dvd", &image);
        let disc = NrgParser.parse(&[path.clone()]).unwrap();

        assert_eq!(disc.medium_type(), MediumType::Dvd);
        let physical = disc.structure(0, 0x00).unwrap();
        assert_eq!(physical.len(), 2048);
        assert_eq!(physical[0], 0x01);
        assert!(disc.structure(0, 0x01).is_some());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn old_format_probe() {
        // Old format: "NERO" at EOF-8, u32 offset at EOF-4.
        let mut image = vec![0u8; 64];
        image.extend(block(b"END!", &[]));
        image.extend_from_slice(b"NERO");
        image.extend_from_slice(&64u32.to_be_bytes());

        let path = write_temp("old", &image);
        assert!(NrgParser.can_handle(&[path.clone()]));
        let _ = std::fs::remove_file(path);
    }
}
