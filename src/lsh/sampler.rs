//! Seeded, stratified selection of hash bit positions.

use crate::descriptor::DESCRIPTOR_BYTES;

/// Redraws allowed before a repeated offset within one byte is accepted.
const MAX_REDRAWS: usize = 20;

/// 32-bit linear congruential generator.
#[derive(Clone, Copy, Debug)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Creates a generator seeded with `seed`.
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advances the generator and returns the new state.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        self.state
    }

    /// Draws a bit offset in `[0, 8)` from the high bits of the state.
    #[inline]
    fn next_bit_offset(&mut self) -> u8 {
        (self.next_u32() >> 29) as u8
    }
}

/// Deterministic generator of hash-defining bit positions.
#[derive(Clone, Copy, Debug)]
pub struct BitPositionSampler {
    key_bits: usize,
    rng: Lcg,
}

impl BitPositionSampler {
    /// Creates a sampler for `key_bits` positions seeded with `seed`.
    pub fn new(key_bits: usize, seed: u32) -> Self {
        Self {
            key_bits,
            rng: Lcg::new(seed),
        }
    }

    /// Returns `key_bits` positions in `[0, 256)`, spread across the 32 bytes.
    ///
    /// Bytes are visited in order and each contributes at most
    /// `ceil(key_bits / 32)` offsets. Duplicate offsets within a byte are
    /// redrawn a bounded number of times, so a duplicate can survive.
    pub fn generate(key_bits: usize, seed: u32) -> Vec<u16> {
        Self::new(key_bits, seed).sample()
    }

    /// Consumes the sampler and draws the positions.
    pub fn sample(mut self) -> Vec<u16> {
        let mut positions = Vec::with_capacity(self.key_bits);
        if self.key_bits == 0 {
            return positions;
        }
        let per_byte = self.key_bits.div_ceil(DESCRIPTOR_BYTES);
        let mut taken = Vec::with_capacity(per_byte);

        'bytes: for byte in 0..DESCRIPTOR_BYTES {
            taken.clear();
            for _ in 0..per_byte {
                if positions.len() == self.key_bits {
                    break 'bytes;
                }
                let mut offset = self.rng.next_bit_offset();
                let mut redraws = 0;
                while taken.contains(&offset) && redraws < MAX_REDRAWS {
                    offset = self.rng.next_bit_offset();
                    redraws += 1;
                }
                taken.push(offset);
                positions.push((byte * 8) as u16 + offset as u16);
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::{BitPositionSampler, Lcg};

    #[test]
    fn lcg_matches_reference_sequence() {
        let mut rng = Lcg::new(0);
        assert_eq!(rng.next_u32(), 1_013_904_223);
        assert_eq!(rng.next_u32(), 1_196_435_762);
    }

    #[test]
    fn positions_are_deterministic_and_in_range() {
        let a = BitPositionSampler::generate(18, 1337);
        let b = BitPositionSampler::generate(18, 1337);
        assert_eq!(a, b);
        assert_eq!(a.len(), 18);
        assert!(a.iter().all(|&p| p < 256));
        assert_ne!(a, BitPositionSampler::generate(18, 1438));
    }

    #[test]
    fn one_position_per_byte_for_narrow_keys() {
        let positions = BitPositionSampler::generate(18, 7);
        for (i, &pos) in positions.iter().enumerate() {
            assert_eq!(pos as usize / 8, i);
        }
    }

    #[test]
    fn wide_keys_take_two_offsets_per_byte() {
        let positions = BitPositionSampler::generate(40, 99);
        assert_eq!(positions.len(), 40);
        assert_eq!(positions[0] / 8, 0);
        assert_eq!(positions[1] / 8, 0);
        assert_eq!(positions[39] / 8, 19);
    }

    #[test]
    fn zero_key_bits_yields_nothing() {
        assert!(BitPositionSampler::generate(0, 1).is_empty());
    }
}
