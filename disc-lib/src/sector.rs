//! The 2352+96 byte sector unit.
//!
//! A [`Sector`] is always materialized in full: whatever the image supplies
//! (2048-byte user data, full raw main channel, optional subchannel) is
//! completed deterministically — sync pattern, BCD header, EDC/ECC parity
//! and synthesized Q — so every channel read is total and reproducible.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::addressing::{Lba, Msf};
use crate::ecc::{ecc_generate, edc_compute};
use crate::subchannel;
use crate::{DiscError, DiscResult};

pub const MAIN_SIZE: usize = 2352;
pub const SUB_SIZE: usize = 96;

/// XA subheader submode bit selecting Form 2.
const SUBMODE_FORM2: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SectorType {
    Audio = 0,
    Mode1 = 1,
    Mode2Formless = 2,
    Mode2Form1 = 3,
    Mode2Form2 = 4,
    Mode2Mixed = 5,
}

impl SectorType {
    /// Header mode byte; audio sectors have no header.
    pub fn header_mode(self) -> u8 {
        match self {
            SectorType::Audio => 0,
            SectorType::Mode1 => 1,
            _ => 2,
        }
    }

    pub fn is_mode2(self) -> bool {
        matches!(
            self,
            SectorType::Mode2Formless
                | SectorType::Mode2Form1
                | SectorType::Mode2Form2
                | SectorType::Mode2Mixed
        )
    }
}

/// Layout context needed to synthesize Q when the image has no subchannel.
#[derive(Debug, Clone, Default)]
pub struct QContext {
    pub track: u8,
    pub index: u8,
    /// Relative MSF within the track (counts down through the pregap).
    pub relative: Msf,
    /// Offset from the physical beginning of the track, pregap included.
    pub track_offset: i32,
    pub ctl: u8,
    pub leadout: bool,
    pub mcn: Option<String>,
    pub isrc: Option<String>,
}

#[derive(Clone)]
pub struct Sector {
    kind: SectorType,
    address: Lba,
    main: [u8; MAIN_SIZE],
    sub: [u8; SUB_SIZE],
}

impl Sector {
    /// Build a sector from image-provided main channel bytes. Accepted input
    /// lengths are the per-type image layouts of the mode-code table; shorter
    /// layouts are completed (sync, header, subheader, EDC/ECC).
    pub fn from_image(
        kind: SectorType,
        address: Lba,
        main_data: &[u8],
        sub_data: Option<&[u8; SUB_SIZE]>,
        ctx: &QContext,
    ) -> DiscResult<Sector> {
        let mut sector = Sector {
            kind,
            address,
            main: [0u8; MAIN_SIZE],
            sub: [0u8; SUB_SIZE],
        };

        match (kind, main_data.len()) {
            (_, 2352) => sector.main.copy_from_slice(main_data),
            (SectorType::Mode1, 2048) => {
                sector.main[16..2064].copy_from_slice(main_data);
                sector.build_sync_header();
                sector.write_edc(0, 2064);
                ecc_generate(&mut sector.main, false);
            }
            (SectorType::Mode2Formless, 2336) | (SectorType::Mode2Mixed, 2336) => {
                sector.main[16..2352].copy_from_slice(main_data);
                sector.build_sync_header();
            }
            (SectorType::Mode2Form1, 2048) => {
                sector.main[24..2072].copy_from_slice(main_data);
                sector.build_sync_header();
                sector.write_edc(16, 2072);
                ecc_generate(&mut sector.main, true);
            }
            (SectorType::Mode2Form1, 2336) | (SectorType::Mode2Form2, 2336) => {
                sector.main[16..2352].copy_from_slice(main_data);
                sector.build_sync_header();
            }
            (SectorType::Mode2Form2, 2324) => {
                sector.main[24..2348].copy_from_slice(main_data);
                sector.main[18] = SUBMODE_FORM2;
                sector.main[22] = SUBMODE_FORM2;
                sector.build_sync_header();
                sector.write_edc(16, 2348);
            }
            (_, len) => {
                return Err(DiscError::Read {
                    offset: 0,
                    desc: format!("unsupported {len}-byte main channel for {kind:?} sector"),
                });
            }
        }

        match sub_data {
            Some(sub) => sector.sub.copy_from_slice(sub),
            None => sector.synthesize_subchannel(ctx),
        }

        Ok(sector)
    }

    /// A synthesized all-zero sector (gaps, lead-out).
    pub fn empty(kind: SectorType, address: Lba, ctx: &QContext) -> Sector {
        let zeros = [0u8; MAIN_SIZE];
        let data: &[u8] = match kind {
            SectorType::Audio | SectorType::Mode2Mixed => &zeros[..],
            SectorType::Mode1 | SectorType::Mode2Form1 => &zeros[..2048],
            SectorType::Mode2Formless => &zeros[..2336],
            SectorType::Mode2Form2 => &zeros[..2324],
        };
        // Infallible: every arm above is an accepted layout.
        match Sector::from_image(kind, address, data, None, ctx) {
            Ok(sector) => sector,
            Err(_) => unreachable!(),
        }
    }

    fn build_sync_header(&mut self) {
        if self.kind == SectorType::Audio {
            return;
        }

        self.main[0] = 0x00;
        for byte in &mut self.main[1..11] {
            *byte = 0xFF;
        }
        self.main[11] = 0x00;

        let (m, s, f) = self.address.to_msf(true).to_bcd();
        self.main[12] = m;
        self.main[13] = s;
        self.main[14] = f;
        self.main[15] = self.kind.header_mode();
    }

    fn write_edc(&mut self, from: usize, at: usize) {
        let edc = edc_compute(&self.main[from..at]);
        self.main[at..at + 4].copy_from_slice(&edc.to_le_bytes());
    }

    fn synthesize_subchannel(&mut self, ctx: &QContext) {
        let absolute = self.address.to_msf(true);

        let q = if ctx.leadout {
            subchannel::q_leadout(ctx.relative, absolute)
        } else if let Some(mcn) = ctx
            .mcn
            .as_deref()
            .filter(|_| self.address.raw().rem_euclid(100) == 25)
        {
            subchannel::q_mcn(ctx.ctl, mcn, absolute)
        } else if let Some(isrc) = ctx
            .isrc
            .as_deref()
            .filter(|_| ctx.track_offset.rem_euclid(100) == 50)
        {
            subchannel::q_isrc(ctx.ctl, isrc, absolute)
        } else {
            subchannel::q_position(ctx.ctl, ctx.track, ctx.index, ctx.relative, absolute)
        };

        self.sub = subchannel::interleave_q(&q);
    }

    pub fn kind(&self) -> SectorType {
        self.kind
    }

    pub fn address(&self) -> Lba {
        self.address
    }

    /// Effective form of a Mode 2 Mixed sector, decided per sector by the
    /// subheader submode bit.
    fn effective_form2(&self) -> bool {
        self.main[18] & SUBMODE_FORM2 != 0
    }

    fn data_span(&self) -> (usize, usize) {
        match self.kind {
            SectorType::Audio => (0, 2352),
            SectorType::Mode1 => (16, 2048),
            SectorType::Mode2Formless => (16, 2336),
            SectorType::Mode2Form1 => (24, 2048),
            SectorType::Mode2Form2 => (24, 2324),
            SectorType::Mode2Mixed => {
                if self.effective_form2() {
                    (24, 2324)
                } else {
                    (24, 2048)
                }
            }
        }
    }

    fn edc_ecc_span(&self) -> (usize, usize) {
        match self.kind {
            SectorType::Audio | SectorType::Mode2Formless => (0, 0),
            SectorType::Mode1 => (2064, 288),
            SectorType::Mode2Form1 => (2072, 280),
            SectorType::Mode2Form2 => (2348, 4),
            SectorType::Mode2Mixed => {
                if self.effective_form2() {
                    (2348, 4)
                } else {
                    (2072, 280)
                }
            }
        }
    }

    /// 12-byte sync pattern; empty for audio.
    pub fn sync(&self) -> &[u8] {
        match self.kind {
            SectorType::Audio => &[],
            _ => &self.main[0..12],
        }
    }

    /// 4-byte header (BCD MSF + mode); empty for audio.
    pub fn header(&self) -> &[u8] {
        match self.kind {
            SectorType::Audio => &[],
            _ => &self.main[12..16],
        }
    }

    /// 8-byte XA subheader; empty for non-XA sector types.
    pub fn subheader(&self) -> &[u8] {
        match self.kind {
            SectorType::Mode2Form1 | SectorType::Mode2Form2 | SectorType::Mode2Mixed => {
                &self.main[16..24]
            }
            _ => &[],
        }
    }

    /// User data for the sector's (effective) type.
    pub fn data(&self) -> &[u8] {
        let (offset, len) = self.data_span();
        &self.main[offset..offset + len]
    }

    /// EDC/ECC trailer bytes; empty where the type carries none.
    pub fn edc_ecc(&self) -> &[u8] {
        let (offset, len) = self.edc_ecc_span();
        &self.main[offset..offset + len]
    }

    /// The whole 2352-byte main channel.
    pub fn main_raw(&self) -> &[u8; MAIN_SIZE] {
        &self.main
    }

    /// The 96 interleaved PW subchannel bytes.
    pub fn subchannel_pw(&self) -> &[u8; SUB_SIZE] {
        &self.sub
    }

    /// Formatted 16-byte Q: 12 decoded bytes plus zero pad.
    pub fn subchannel_q(&self) -> [u8; 16] {
        let q = subchannel::deinterleave_q(&self.sub);
        let mut out = [0u8; 16];
        out[0..12].copy_from_slice(&q);
        out
    }

    /// Check the stored EDC against a recomputation over the main channel.
    /// Bad-sector emulation relies on images storing a mismatching EDC.
    pub fn verify_edc(&self) -> bool {
        let (check_from, stored_at) = match self.kind {
            SectorType::Audio | SectorType::Mode2Formless => return true,
            SectorType::Mode1 => (0, 2064),
            SectorType::Mode2Form1 => (16, 2072),
            SectorType::Mode2Form2 => (16, 2348),
            SectorType::Mode2Mixed => {
                if self.effective_form2() {
                    (16, 2348)
                } else {
                    (16, 2072)
                }
            }
        };

        let stored = u32::from_le_bytes([
            self.main[stored_at],
            self.main[stored_at + 1],
            self.main[stored_at + 2],
            self.main[stored_at + 3],
        ]);

        // Form 2 EDC is optional; an all-zero field means "not recorded".
        if stored == 0 && stored_at == 2348 {
            return true;
        }

        edc_compute(&self.main[check_from..stored_at]) == stored
    }
}
