//! Composite checksum over sampled windows
//!
//! Each sample contributes the CRC-32 of its bytes shifted into the 32-bit
//! lane named by its part index. A whole-file sample lands in bits 0..32;
//! windowed samples land in bits 32..128 and leave the lowest lane zero.

use crate::record::Sample;
use flate2::Crc;

/// Width of one checksum lane in bits
pub const LANE_BITS: u32 = 32;

/// CRC-32 (IEEE, as used by zlib) of a byte slice
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum()
}

/// Folds samples into one composite value
///
/// The result does not depend on sample order.
pub fn composite_checksum(samples: &[Sample]) -> u128 {
    samples.iter().fold(0u128, |acc, sample| {
        acc | (u128::from(crc32(&sample.bytes)) << (u32::from(sample.part_index) * LANE_BITS))
    })
}
