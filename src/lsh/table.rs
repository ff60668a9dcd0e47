//! A single LSH hash table over selected descriptor bits.

use crate::descriptor::{descriptor_bit, Descriptor, DescriptorView};
use std::collections::HashMap;

/// Bucket occupancy summary for one table.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TableStats {
    /// Number of non-empty buckets.
    pub buckets: usize,
    /// Size of the largest bucket.
    pub max_bucket: usize,
    /// Mean bucket size over non-empty buckets.
    pub mean_bucket: f32,
}

/// Hash table keyed by a fixed subset of descriptor bits.
#[derive(Clone, Debug)]
pub struct LshTable {
    bit_positions: Vec<u16>,
    buckets: HashMap<u32, Vec<u32>>,
}

impl LshTable {
    /// Hashes every row of `corpus` into buckets keyed on `bit_positions`.
    pub(crate) fn build(bit_positions: Vec<u16>, corpus: DescriptorView<'_>) -> Self {
        debug_assert!(bit_positions.len() <= 32);
        let mut buckets: HashMap<u32, Vec<u32>> = HashMap::new();
        for (row, desc) in corpus.iter().enumerate() {
            let key = hash_bits(&bit_positions, desc);
            buckets.entry(key).or_default().push(row as u32);
        }
        Self {
            bit_positions,
            buckets,
        }
    }

    /// Returns the bit positions defining this table's hash.
    pub fn bit_positions(&self) -> &[u16] {
        &self.bit_positions
    }

    /// Returns the hash width in bits.
    pub fn key_bits(&self) -> usize {
        self.bit_positions.len()
    }

    /// Computes this table's hash for a descriptor.
    #[inline]
    pub fn hash(&self, desc: &Descriptor) -> u32 {
        hash_bits(&self.bit_positions, desc)
    }

    /// Returns the reference rows stored under `key`, in ascending order.
    pub fn bucket(&self, key: u32) -> &[u32] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates `(key, rows)` pairs in unspecified order.
    pub fn buckets(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.buckets.iter().map(|(&key, rows)| (key, rows.as_slice()))
    }

    /// Summarizes bucket occupancy.
    pub fn stats(&self) -> TableStats {
        let buckets = self.buckets.len();
        if buckets == 0 {
            return TableStats::default();
        }
        let total: usize = self.buckets.values().map(Vec::len).sum();
        let max_bucket = self.buckets.values().map(Vec::len).max().unwrap_or(0);
        TableStats {
            buckets,
            max_bucket,
            mean_bucket: total as f32 / buckets as f32,
        }
    }
}

/// Bit `i` of the result is bit `bit_positions[i]` of the descriptor.
#[inline]
fn hash_bits(bit_positions: &[u16], desc: &Descriptor) -> u32 {
    let mut key = 0u32;
    for (i, &pos) in bit_positions.iter().enumerate() {
        if descriptor_bit(desc, pos) {
            key |= 1 << i;
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::LshTable;
    use crate::descriptor::{Descriptor, DescriptorView};

    #[test]
    fn hash_reads_selected_bits_in_order() {
        let table = LshTable::build(vec![0, 9, 255], DescriptorView::new(&[], 0).unwrap());
        let mut desc: Descriptor = [0u8; 32];
        assert_eq!(table.hash(&desc), 0);
        desc[1] = 0b10;
        assert_eq!(table.hash(&desc), 0b010);
        desc[31] = 0x80;
        assert_eq!(table.hash(&desc), 0b110);
        desc[0] = 1;
        assert_eq!(table.hash(&desc), 0b111);
    }

    #[test]
    fn rows_land_in_shared_bucket() {
        let mut corpus = [[0u8; 32]; 3];
        corpus[2][0] = 1;
        let table = LshTable::build(vec![0, 1], DescriptorView::from_descriptors(&corpus));
        assert_eq!(table.bucket(0), &[0, 1]);
        assert_eq!(table.bucket(1), &[2]);
        assert!(table.bucket(3).is_empty());

        let stats = table.stats();
        assert_eq!(stats.buckets, 2);
        assert_eq!(stats.max_bucket, 2);
        assert!((stats.mean_bucket - 1.5).abs() < 1e-6);
    }
}
