//! CD-ROM error detection and correction codes.
//!
//! EDC is the CRC-32/CD-ROM-EDC polynomial over the sector area mandated by
//! the sector mode; ECC is the ECMA-130 Reed-Solomon product code (P and Q
//! parity planes) over GF(2^8).

use crc::Crc;

const CD_EDC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_CD_ROM_EDC);

/// EDC over `data`, to be stored little-endian in the sector.
pub fn edc_compute(data: &[u8]) -> u32 {
    CD_EDC.checksum(data)
}

struct GfLuts {
    f: [u8; 256],
    b: [u8; 256],
}

const fn build_luts() -> GfLuts {
    let mut f = [0u8; 256];
    let mut b = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        let j = ((i << 1) ^ (if i & 0x80 != 0 { 0x11D } else { 0 })) & 0xFF;
        f[i] = j as u8;
        b[i ^ j] = i as u8;
        i += 1;
    }
    GfLuts { f, b }
}

const LUTS: GfLuts = build_luts();

/// One parity plane. `dest_offset` must lie past the covered input range.
fn compute_block(
    sector: &mut [u8; 2352],
    major_count: usize,
    minor_count: usize,
    major_mult: usize,
    minor_inc: usize,
    dest_offset: usize,
) {
    let size = major_count * minor_count;
    for major in 0..major_count {
        let mut index = (major >> 1) * major_mult + (major & 1);
        let mut ecc_a = 0u8;
        let mut ecc_b = 0u8;
        for _ in 0..minor_count {
            let temp = sector[0x0C + index];
            index += minor_inc;
            if index >= size {
                index -= size;
            }
            ecc_a ^= temp;
            ecc_b ^= temp;
            ecc_a = LUTS.f[ecc_a as usize];
        }
        ecc_a = LUTS.b[(LUTS.f[ecc_a as usize] ^ ecc_b) as usize];
        sector[dest_offset + major] = ecc_a;
        sector[dest_offset + major + major_count] = ecc_a ^ ecc_b;
    }
}

/// Write P parity (bytes 0x81C..0x8C8) and Q parity (0x8C8..0x930) for the
/// sector. `zero_address` computes parity as if the 4 header bytes were zero
/// (Mode 2 Form 1, whose ECC excludes the header).
pub fn ecc_generate(sector: &mut [u8; 2352], zero_address: bool) {
    let saved = [sector[12], sector[13], sector[14], sector[15]];
    if zero_address {
        sector[12..16].fill(0);
    }

    // P plane: 86 columns of 24 bytes over bytes 0x0C..0x81C.
    compute_block(sector, 86, 24, 2, 86, 0x81C);
    // Q plane: 52 diagonals of 43 bytes over bytes 0x0C..0x8C8 (P included).
    compute_block(sector, 52, 43, 86, 88, 0x8C8);

    if zero_address {
        sector[12..16].copy_from_slice(&saved);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn edc_of_empty_is_zero() {
        assert_eq!(edc_compute(&[0u8; 2064]), 0);
    }

    #[test]
    fn ecc_of_zero_sector_is_zero() {
        let mut sector = [0u8; 2352];
        ecc_generate(&mut sector, false);
        assert!(sector.iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_address_parity_ignores_header() {
        let mut with_header = [0u8; 2352];
        with_header[12] = 0x12;
        with_header[13] = 0x34;
        with_header[14] = 0x56;
        with_header[15] = 0x02;

        let mut blank = [0u8; 2352];

        ecc_generate(&mut with_header, true);
        ecc_generate(&mut blank, false);

        assert_eq!(with_header[0x81C..], blank[0x81C..]);
        // Header itself must be restored.
        assert_eq!(&with_header[12..16], &[0x12, 0x34, 0x56, 0x02]);
    }

    #[test]
    fn parity_depends_on_data() {
        let mut a = [0u8; 2352];
        let mut b = [0u8; 2352];
        b[100] = 0xAB;
        ecc_generate(&mut a, false);
        ecc_generate(&mut b, false);
        assert_ne!(a[0x81C..0x930], b[0x81C..0x930]);
    }
}
