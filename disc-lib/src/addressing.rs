//! Block addressing.
//!
//! Disc positions are kept as signed logical block addresses so the lead-in
//! (negative addresses on a CD whose layout starts at -150) needs no special
//! casing. MSF is the 75-frames-per-second, 60-seconds-per-minute timecode
//! the MMC command set renders addresses in.

use std::fmt;

use derive_more::{Add, AddAssign, From, Into, Neg, Sub, SubAssign};

use crate::bcd::{bcd_to_hex, hex_to_bcd};

pub const FRAMES_PER_SECOND: i32 = 75;
pub const FRAMES_PER_MINUTE: i32 = FRAMES_PER_SECOND * 60;

/// Red Book pregap between 00:00:00 and the first addressable user sector.
pub const LEAD_IN_FRAMES: i32 = 150;

/// Wrap point for rendering negative (lead-in) addresses as MSF.
const MSF_WRAP: i32 = 100 * 60 * FRAMES_PER_SECOND;

/// Newtype representing a Logical Block Address.
///
/// LBA 0 corresponds to 00:02:00, the start of the user area; the 150-frame
/// pregap before it occupies addresses -150..0.
#[repr(transparent)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Add,
    AddAssign,
    Sub,
    SubAssign,
    Neg,
)]
pub struct Lba(i32);

impl Lba {
    pub const ZERO: Lba = Lba(0);

    pub fn raw(self) -> i32 {
        self.0
    }

    /// The address `count` sectors further along the spiral.
    pub fn offset(self, count: i32) -> Lba {
        Lba(self.0 + count)
    }

    /// Render as MSF, biased by the 150-frame lead-in offset when
    /// `with_lead_in` is set. Negative addresses wrap around 100 minutes the
    /// way lead-in timecodes do on a pressed disc.
    pub fn to_msf(self, with_lead_in: bool) -> Msf {
        let mut frames = self.0;
        if with_lead_in {
            frames += LEAD_IN_FRAMES;
        }
        if frames < 0 {
            frames += MSF_WRAP;
        }

        let m = frames / FRAMES_PER_MINUTE;
        frames -= m * FRAMES_PER_MINUTE;
        let s = frames / FRAMES_PER_SECOND;
        frames -= s * FRAMES_PER_SECOND;

        Msf::new(m as u8, s as u8, frames as u8)
    }
}

impl fmt::Display for Lba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minute, Second, Frame timecode. Fields are plain binary; BCD only at the
/// wire boundary via [`Msf::to_bcd`] / [`Msf::from_bcd`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Msf {
    pub m: u8,
    pub s: u8,
    pub f: u8,
}

impl Msf {
    pub fn new(m: u8, s: u8, f: u8) -> Msf {
        Msf { m, s, f }
    }

    /// Inverse of [`Lba::to_msf`].
    pub fn to_lba(self, with_lead_in: bool) -> Lba {
        let frames = i32::from(self.m) * FRAMES_PER_MINUTE
            + i32::from(self.s) * FRAMES_PER_SECOND
            + i32::from(self.f);

        Lba(if with_lead_in {
            frames - LEAD_IN_FRAMES
        } else {
            frames
        })
    }

    pub fn to_bcd(self) -> (u8, u8, u8) {
        (hex_to_bcd(self.m), hex_to_bcd(self.s), hex_to_bcd(self.f))
    }

    pub fn from_bcd(m: u8, s: u8, f: u8) -> Msf {
        Msf::new(bcd_to_hex(m), bcd_to_hex(s), bcd_to_hex(f))
    }
}

impl fmt::Display for Msf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.m, self.s, self.f)
    }
}
