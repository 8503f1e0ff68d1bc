//! User-space ATAPI CD/DVD-ROM drive emulation.
//!
//! [`device::Device`] owns one emulated drive: the MMC dispatcher with its
//! mode-page and feature databases, the audio playback state machine, the
//! seek-timing model and the kernel transport bridge. Disc images come from
//! the `disc-lib` parsers. The control-plane surface (load/unload, status,
//! options, monitors) is what a thin RPC layer exposes to clients.

pub mod commands;
pub mod device;
pub mod sense;
