//! Hamming distance between 256-bit codes.

use super::{Descriptor, DESCRIPTOR_BITS};

const fn build_popcount_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() as u8;
        i += 1;
    }
    table
}

/// Population count for every byte value.
pub static POPCOUNT_TABLE: [u8; 256] = build_popcount_table();

/// Number of differing bits between two descriptors, in `[0, 256]`.
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    let mut dist = 0u32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dist += POPCOUNT_TABLE[(x ^ y) as usize] as u32;
    }
    debug_assert!(dist as usize <= DESCRIPTOR_BITS);
    dist
}
