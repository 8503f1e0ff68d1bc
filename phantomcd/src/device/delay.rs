//! Seek and transfer delay emulation.
//!
//! Copy protections time batches of short and long seeks; the ratios
//! between those times encode the sector density curve a pressed disc would
//! have. The model: the head angle per sector comes from the image's DPM
//! data, seeks shorter than 10 rotations cost their rotational time at a
//! fixed 12000 rpm, longer seeks collapse to a 20 ms head move per 10
//! rotations. Transfer delay spreads the same density over the sectors
//! read, which draws the expected CAV curve in speed-test tools.

use std::time::Instant;

use disc_lib::{Disc, Lba};
use tracing::trace;

const ROTATIONS_PER_SECOND: f64 = 12000.0 / 60.0;

/// Upper bound per command; corrupt DPM data must not stall the transport
/// thread indefinitely.
const MAX_DELAY_US: f64 = 2_000_000.0;

pub struct DelayEmulation {
    pub dpm_emulation: bool,
    pub tr_emulation: bool,
    current_angle: f64,
    begin: Option<Instant>,
    amount_us: f64,
}

impl DelayEmulation {
    pub fn new() -> DelayEmulation {
        DelayEmulation {
            dpm_emulation: true,
            tr_emulation: false,
            current_angle: 0.0,
            begin: None,
            amount_us: 0.0,
        }
    }

    /// Capture the wall clock and compute the target delay for a read of
    /// `num_sectors` starting at `address`. Without DPM coverage for the
    /// address no delay accumulates.
    pub fn begin(&mut self, disc: Option<&Disc>, address: Lba, num_sectors: i32) {
        self.begin = Some(Instant::now());
        self.amount_us = 0.0;

        let Some(dpm) = disc.and_then(Disc::dpm) else {
            return;
        };
        let Some((angle, density)) = dpm.angle_and_density(address) else {
            trace!(address = address.raw(), "no DPM data for sector");
            return;
        };

        if self.dpm_emulation {
            let mut rotations = (angle - self.current_angle).abs();
            self.current_angle = angle;

            // Long seeks don't follow the spiral; the head shortcuts in
            // ~20 ms and lands within 10 rotations of the target.
            if rotations >= 10.0 {
                while rotations >= 10.0 {
                    rotations -= 10.0;
                }
                self.amount_us += 20.0 * 1000.0;
            }

            self.amount_us += rotations / ROTATIONS_PER_SECOND * 1_000_000.0;
        }

        if self.tr_emulation {
            let sectors_per_second = density * ROTATIONS_PER_SECOND;
            self.amount_us += f64::from(num_sectors) / sectors_per_second * 1_000_000.0;
        }
    }

    /// Subtract the elapsed processing time from the target delay and sleep
    /// the remainder, if any is left.
    pub fn finalize(&mut self) {
        if self.amount_us <= 0.0 {
            return;
        }
        let Some(begin) = self.begin.take() else {
            return;
        };

        let processing_us = begin.elapsed().as_micros() as f64;
        let delay = (self.amount_us - processing_us).min(MAX_DELAY_US);
        trace!(target = self.amount_us, processing = processing_us, "delay");

        if delay > 0.0 {
            std::thread::sleep(std::time::Duration::from_micros(delay as u64));
        }

        self.amount_us = 0.0;
    }
}
