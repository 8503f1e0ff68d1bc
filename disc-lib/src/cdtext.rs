//! CD-TEXT pack encoding and decoding.
//!
//! CD-TEXT lives in the lead-in as a stream of 18-byte packs: a 4-byte
//! header (pack type, track number, sequence, block/position), 12 payload
//! bytes and a complemented CRC-16. Text payloads are zero-terminated per
//! entity (disc = track 0, then each track) and flow across pack
//! boundaries.

use std::collections::BTreeMap;

use crate::subchannel::q_crc;

pub const PACK_TITLE: u8 = 0x80;
pub const PACK_PERFORMER: u8 = 0x81;
pub const PACK_SONGWRITER: u8 = 0x82;
pub const PACK_COMPOSER: u8 = 0x83;
pub const PACK_ARRANGER: u8 = 0x84;
pub const PACK_MESSAGE: u8 = 0x85;
pub const PACK_DISC_ID: u8 = 0x86;
pub const PACK_GENRE: u8 = 0x87;
pub const PACK_TOC_INFO1: u8 = 0x88;
pub const PACK_TOC_INFO2: u8 = 0x89;
pub const PACK_UPC_EAN: u8 = 0x8E;
pub const PACK_SIZE_INFO: u8 = 0x8F;

pub const PACK_LEN: usize = 18;
const PAYLOAD_LEN: usize = 12;

/// CD-TEXT data of one language for one entity (disc or track): pack
/// payloads keyed by pack type. Text payloads carry their terminating NUL.
#[derive(Debug, Clone, Default)]
pub struct Language {
    pub code: u16,
    packs: BTreeMap<u8, Vec<u8>>,
}

impl Language {
    pub fn new(code: u16) -> Language {
        Language {
            code,
            packs: BTreeMap::new(),
        }
    }

    pub fn set_pack(&mut self, pack_type: u8, data: Vec<u8>) {
        self.packs.insert(pack_type, data);
    }

    pub fn pack(&self, pack_type: u8) -> Option<&[u8]> {
        self.packs.get(&pack_type).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.packs.iter().map(|(&t, d)| (t, d.as_slice()))
    }
}

/// One entity's payload for one pack type. Text payloads carry their
/// terminating NUL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackData {
    /// 0 for disc-level data, 1.. for tracks.
    pub track: u8,
    pub pack_type: u8,
    pub data: Vec<u8>,
}

/// Encode one language block (language `block` index 0..=7).
fn encode_block(entries: &[PackData], block: u8, out: &mut Vec<u8>) {
    let mut by_type: BTreeMap<u8, Vec<&PackData>> = BTreeMap::new();
    for entry in entries {
        by_type.entry(entry.pack_type).or_default().push(entry);
    }

    let mut seq = 0u8;
    for (pack_type, mut list) in by_type {
        list.sort_by_key(|e| e.track);

        // Flatten the per-entity payloads, remembering for every byte the
        // entity it belongs to and its character position within it.
        let mut stream: Vec<(u8, u8, u8)> = Vec::new();
        for entry in list {
            for (i, &byte) in entry.data.iter().enumerate() {
                stream.push((byte, entry.track, i.min(15) as u8));
            }
        }

        for chunk in stream.chunks(PAYLOAD_LEN) {
            let mut pack = [0u8; PACK_LEN];
            pack[0] = pack_type;
            pack[1] = chunk[0].1;
            pack[2] = seq;
            pack[3] = (block << 4) | chunk[0].2;
            for (i, &(byte, _, _)) in chunk.iter().enumerate() {
                pack[4 + i] = byte;
            }

            let crc = q_crc(&pack[0..16]);
            pack[16] = (crc >> 8) as u8;
            pack[17] = crc as u8;

            out.extend_from_slice(&pack);
            seq = seq.wrapping_add(1);
        }
    }
}

/// Encode all language blocks, in block order, into one raw pack stream.
pub fn encode(blocks: &[Vec<PackData>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (block, entries) in blocks.iter().enumerate() {
        encode_block(entries, block as u8, &mut out);
    }
    out
}

/// Decode a raw pack stream back into per-block entity payloads. Packs with
/// unknown types or bad length are skipped; CRCs are not enforced (images in
/// the wild frequently store them zeroed).
pub fn decode(raw: &[u8]) -> Vec<Vec<PackData>> {
    // (block, type) -> (first track number, concatenated payload)
    let mut streams: BTreeMap<(u8, u8), (u8, Vec<u8>)> = BTreeMap::new();

    for pack in raw.chunks_exact(PACK_LEN) {
        let pack_type = pack[0];
        if !(PACK_TITLE..=PACK_SIZE_INFO).contains(&pack_type) {
            continue;
        }
        let track = pack[1];
        let block = (pack[3] >> 4) & 0x07;

        let entry = streams
            .entry((block, pack_type))
            .or_insert_with(|| (track, Vec::new()));
        entry.1.extend_from_slice(&pack[4..16]);
    }

    let max_block = streams.keys().map(|&(b, _)| b).max().unwrap_or(0);
    let mut blocks: Vec<Vec<PackData>> = vec![Vec::new(); max_block as usize + 1];

    for ((block, pack_type), (first_track, payload)) in streams {
        // Trailing pad zeros would otherwise read as empty entities.
        let trimmed_len = payload
            .iter()
            .rposition(|&b| b != 0)
            .map(|p| p + 2)
            .unwrap_or(0)
            .min(payload.len());

        let mut track = first_track;
        for piece in payload[..trimmed_len].split_inclusive(|&b| b == 0) {
            blocks[block as usize].push(PackData {
                track,
                pack_type,
                data: piece.to_vec(),
            });
            track += 1;
        }
    }

    blocks
}
