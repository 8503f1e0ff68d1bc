//! Data Position Measurement curves.
//!
//! Copy-protection tools measure how the laser head angle advances per
//! sector; images produced by such tools carry the measurement back. Entries
//! hold the cumulative head angle, in 16.16 fixed-point rotations, at every
//! `resolution`-sector boundary starting at `start_sector`.

use crate::addressing::Lba;

#[derive(Debug, Clone)]
pub struct DpmData {
    pub start_sector: i32,
    pub resolution: i32,
    pub entries: Vec<u32>,
}

impl DpmData {
    /// Angle (rotations from the measurement origin) and local density
    /// (sectors per full rotation) at `lba`, linearly interpolated between
    /// the surrounding entries. `None` when the curve does not cover the
    /// address.
    pub fn angle_and_density(&self, lba: Lba) -> Option<(f64, f64)> {
        if self.resolution <= 0 {
            return None;
        }

        let relative = lba.raw() - self.start_sector;
        if relative < 0 {
            return None;
        }

        let index = (relative / self.resolution) as usize;
        if index + 1 >= self.entries.len() {
            return None;
        }

        let a0 = f64::from(self.entries[index]) / 65536.0;
        let a1 = f64::from(self.entries[index + 1]) / 65536.0;
        let per_interval = a1 - a0;
        if per_interval <= 0.0 {
            return None;
        }

        let fraction = f64::from(relative % self.resolution) / f64::from(self.resolution);
        let angle = a0 + per_interval * fraction;
        let density = f64::from(self.resolution) / per_interval;

        Some((angle, density))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn curve() -> DpmData {
        // 10 rotations per 500-sector interval => 50 sectors per rotation.
        DpmData {
            start_sector: 0,
            resolution: 500,
            entries: (0..10u32).map(|i| i * 10 * 65536).collect(),
        }
    }

    #[test]
    fn interpolates() {
        let (angle, density) = curve().angle_and_density(Lba::from(250)).unwrap();
        assert!((angle - 5.0).abs() < 1e-9);
        assert!((density - 50.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range() {
        assert!(curve().angle_and_density(Lba::from(-1)).is_none());
        assert!(curve().angle_and_density(Lba::from(500 * 9)).is_none());
    }
}
