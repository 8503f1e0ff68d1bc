//! Image parsers.
//!
//! Each format-specific parser cheaply probes the given filenames and either
//! declines (the loader moves on to the next parser) or produces a fully
//! populated [`Disc`].

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::disc::Disc;
use crate::sector::SectorType;
use crate::{DiscError, DiscResult};

pub mod nrg;
pub mod tocfile;

pub trait ImageParser {
    fn name(&self) -> &'static str;

    /// Cheap probe: extension plus a shallow content check.
    fn can_handle(&self, filenames: &[PathBuf]) -> bool;

    fn parse(&self, filenames: &[PathBuf]) -> DiscResult<Disc>;
}

/// Run the filenames through the registered parsers in order.
pub fn load_image(filenames: &[PathBuf]) -> DiscResult<Disc> {
    let parsers: [&dyn ImageParser; 2] = [&tocfile::TocFileParser, &nrg::NrgParser];

    for parser in parsers {
        if !parser.can_handle(filenames) {
            continue;
        }
        debug!(parser = parser.name(), "parsing image");
        return parser.parse(filenames);
    }

    Err(DiscError::CannotHandle(
        filenames.first().cloned().unwrap_or_default(),
    ))
}

/// Decode the merged MDS/NRG track mode-code taxonomy into sector type plus
/// per-sector main and subchannel sizes as stored in the image.
pub(crate) fn decode_mode_code(code: u8) -> Option<(SectorType, usize, usize)> {
    Some(match code {
        0x00 | 0x03 => (SectorType::Mode2Formless, 2336, 0),
        0x01 | 0xA9 => (SectorType::Audio, 2352, 0),
        0x02 | 0xAA => (SectorType::Mode1, 2048, 0),
        0x04 | 0xAC => (SectorType::Mode2Form1, 2048, 0),
        0x05 | 0xAD => (SectorType::Mode2Form2, 2324, 0),
        0x06 => (SectorType::Mode2Mixed, 2352, 0),
        0x07 => (SectorType::Audio, 2352, 0),
        0x0F => (SectorType::Mode1, 2352, 96),
        0x10 => (SectorType::Audio, 2352, 96),
        0x11 => (SectorType::Mode2Mixed, 2352, 96),
        _ => return None,
    })
}

/// Resolve a payload file referenced by an index file: as given, or relative
/// to the index file's directory.
pub(crate) fn find_data_file(referenced: &str, index_path: &Path) -> DiscResult<PathBuf> {
    let direct = PathBuf::from(referenced);
    if direct.is_file() {
        return Ok(direct);
    }

    if let Some(parent) = index_path.parent() {
        let sibling = parent.join(referenced);
        if sibling.is_file() {
            return Ok(sibling);
        }
    }

    Err(DiscError::DataFileMissing(direct))
}
