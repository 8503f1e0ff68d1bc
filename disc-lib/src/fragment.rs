//! Fragments: lazy, typed windows over backing data.
//!
//! A track's data is a run of fragments; each fragment maps a contiguous
//! range of sectors onto a backing stream (or onto nothing, for gaps).
//! Fragments are cheap to clone; the streams behind them are shared and
//! read-only.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::sector::MAIN_SIZE;
use crate::{DiscError, DiscResult};

/// Positional read access to an image payload. Implementations must be
/// thread-safe; fragments on different tracks may be read concurrently.
pub trait BlobStream: Send + Sync {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
}

impl BlobStream for File {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        FileExt::read_exact_at(self, buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl BlobStream for Vec<u8> {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of in-memory stream",
            ));
        }
        buf.copy_from_slice(&self[offset..end]);
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

pub type SharedStream = Arc<dyn BlobStream>;

/// Interpretation of main channel bytes in a binary fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainFormat {
    Data,
    Audio,
    /// Audio stored with swapped byte order (big-endian samples).
    AudioByteSwapped,
}

bitflags! {
    /// Layout of subchannel bytes accompanying each sector.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SubFormat: u32 {
        const PW96_INTERLEAVED = 1 << 0;
        const PW96_LINEAR = 1 << 1;
        const RW96 = 1 << 2;
        /// Subchannel interleaved with main data in the same stream.
        const INTERNAL = 1 << 3;
        /// Subchannel in a separate stream.
        const EXTERNAL = 1 << 4;
    }
}

/// A sector-aligned window over a backing source.
#[derive(Clone)]
pub enum Fragment {
    /// Synthetic zeros: pregaps and gaps.
    Null { len: i32 },
    /// A slice of a binary image file, optionally with subchannel.
    Binary {
        stream: SharedStream,
        main_offset: u64,
        main_size: usize,
        main_format: MainFormat,
        sub_offset: u64,
        sub_size: usize,
        sub_format: SubFormat,
        len: i32,
    },
    /// Decoded audio; the stream yields host-endian PCM at 2352 bytes per
    /// sector. Decoder failures surface as read errors.
    Audio {
        stream: SharedStream,
        byte_offset: u64,
        len: i32,
    },
}

impl Fragment {
    /// Length in sectors.
    pub fn length(&self) -> i32 {
        match self {
            Fragment::Null { len } => *len,
            Fragment::Binary { len, .. } => *len,
            Fragment::Audio { len, .. } => *len,
        }
    }

    /// Main channel size in bytes per sector as stored in the image.
    pub fn main_size(&self) -> usize {
        match self {
            Fragment::Null { .. } => MAIN_SIZE,
            Fragment::Binary { main_size, .. } => *main_size,
            Fragment::Audio { .. } => MAIN_SIZE,
        }
    }

    /// Subchannel size in bytes per sector as stored in the image (0 or 96).
    pub fn sub_size(&self) -> usize {
        match self {
            Fragment::Binary { sub_size, .. } => *sub_size,
            _ => 0,
        }
    }

    fn check_range(&self, sector_offset: i32) -> DiscResult<()> {
        if sector_offset < 0 || sector_offset >= self.length() {
            return Err(DiscError::Read {
                offset: sector_offset as u64,
                desc: "sector offset outside fragment".to_string(),
            });
        }
        Ok(())
    }

    /// Read one sector's main channel bytes; `out` receives
    /// `self.main_size()` bytes.
    pub fn read_main(&self, sector_offset: i32, out: &mut [u8]) -> DiscResult<usize> {
        self.check_range(sector_offset)?;

        match self {
            Fragment::Null { .. } => {
                out[..MAIN_SIZE].fill(0);
                Ok(MAIN_SIZE)
            }
            Fragment::Binary {
                stream,
                main_offset,
                main_size,
                main_format,
                sub_size,
                ..
            } => {
                let stride = (*main_size + *sub_size) as u64;
                let offset = *main_offset + sector_offset as u64 * stride;
                let out = &mut out[..*main_size];
                stream.read_exact_at(offset, out).map_err(|e| DiscError::Read {
                    offset,
                    desc: e.to_string(),
                })?;

                if *main_format == MainFormat::AudioByteSwapped {
                    for pair in out.chunks_exact_mut(2) {
                        pair.swap(0, 1);
                    }
                }

                Ok(*main_size)
            }
            Fragment::Audio {
                stream,
                byte_offset,
                ..
            } => {
                let offset = *byte_offset + sector_offset as u64 * MAIN_SIZE as u64;
                stream
                    .read_exact_at(offset, &mut out[..MAIN_SIZE])
                    .map_err(|e| DiscError::Read {
                        offset,
                        desc: e.to_string(),
                    })?;
                Ok(MAIN_SIZE)
            }
        }
    }

    /// Read one sector's subchannel bytes; yields 96 bytes when the fragment
    /// carries subchannel, 0 otherwise.
    pub fn read_sub(&self, sector_offset: i32, out: &mut [u8]) -> DiscResult<usize> {
        self.check_range(sector_offset)?;

        match self {
            Fragment::Binary {
                stream,
                main_offset,
                main_size,
                sub_offset,
                sub_size,
                sub_format,
                ..
            } if *sub_size > 0 => {
                let offset = if sub_format.contains(SubFormat::INTERNAL) {
                    // Interleaved: subchannel follows each sector's main data.
                    *main_offset
                        + sector_offset as u64 * (*main_size + *sub_size) as u64
                        + *main_size as u64
                } else {
                    *sub_offset + sector_offset as u64 * *sub_size as u64
                };

                stream
                    .read_exact_at(offset, &mut out[..*sub_size])
                    .map_err(|e| DiscError::Read {
                        offset,
                        desc: e.to_string(),
                    })?;
                Ok(*sub_size)
            }
            _ => Ok(0),
        }
    }

    /// Set the fragment length so that it covers the rest of its backing
    /// stream. Used by parsers for directives without an explicit length.
    pub fn use_rest_of_stream(&mut self) -> DiscResult<()> {
        match self {
            Fragment::Null { .. } => Ok(()),
            Fragment::Binary {
                stream,
                main_offset,
                main_size,
                sub_size,
                len,
                ..
            } => {
                let available = stream.size()?.saturating_sub(*main_offset);
                *len = (available / (*main_size + *sub_size) as u64) as i32;
                Ok(())
            }
            Fragment::Audio {
                stream,
                byte_offset,
                len,
            } => {
                let available = stream.size()?.saturating_sub(*byte_offset);
                *len = (available / MAIN_SIZE as u64) as i32;
                Ok(())
            }
        }
    }
}
