//! In-memory model of optical disc images and the parsers that produce it.
//!
//! The object graph is strictly downward-owning: a [`Disc`] owns
//! [`Session`]s, a session owns [`Track`]s, a track owns [`Fragment`]s.
//! Lookups hand out references resolved from the top; nothing keeps a parent
//! pointer. Backing data files are shared between fragments through
//! reference-counted [`fragment::BlobStream`] handles.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod addressing;
pub mod bcd;
pub mod cdtext;
pub mod disc;
pub mod dpm;
pub mod ecc;
pub mod fragment;
pub mod parsers;
pub mod sector;
pub mod session;
pub mod subchannel;
pub mod track;

pub use addressing::{Lba, Msf};
pub use disc::{Disc, MediumType};
pub use fragment::Fragment;
pub use sector::{Sector, SectorType};
pub use session::{Session, SessionType};
pub use track::Track;

/// Error type for disc and image operations.
#[derive(Error, Debug)]
pub enum DiscError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("parser cannot handle `{0}`")]
    CannotHandle(PathBuf),
    #[error("corrupted image `{path}`|{line}: {desc}")]
    Parse {
        path: PathBuf,
        line: u32,
        desc: String,
    },
    #[error("data file `{0}` not found")]
    DataFileMissing(PathBuf),
    #[error("read failed at byte offset {offset} in backing stream: {desc}")]
    Read { offset: u64, desc: String },
    #[error("sector address {0} outside disc layout")]
    OutOfRange(Lba),
    #[error("no track contains address {0}")]
    BadTrack(Lba),
    #[error("attempted to access an invalid session")]
    BadSession,
}

/// Convenience alias used throughout the crate.
pub type DiscResult<T> = std::result::Result<T, DiscError>;
