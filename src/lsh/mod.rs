//! Locality-sensitive hash index over a reference descriptor corpus.
//!
//! The index is built once from an owned copy of the corpus and never mutated
//! afterwards, so a single instance can serve concurrent match calls. Each
//! table hashes a seeded subset of descriptor bits; near-identical codes share
//! buckets with high probability.

mod sampler;
mod table;

pub use sampler::{BitPositionSampler, Lcg};
pub use table::{LshTable, TableStats};

use crate::descriptor::{hamming_distance, Descriptor, DescriptorView};
use crate::trace::{trace_event, trace_span};
use crate::util::math::mean_std;
use crate::util::{LshTrackError, LshTrackResult};

/// Seed offset between consecutive tables.
const TABLE_SEED_STRIDE: u32 = 101;

/// Upper bound on row pairs sampled for [`DescriptorStats`].
const MAX_STATS_SAMPLES: usize = 500;

/// Configuration for building an [`LshIndex`].
#[derive(Clone, Debug)]
pub struct LshConfig {
    /// Number of independent hash tables.
    pub num_tables: usize,
    /// Hash width in bits (1..=32).
    pub key_bits: usize,
    /// Seed of table 0; table `t` uses `seed_base + t * 101`.
    pub seed_base: u32,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            num_tables: 10,
            key_bits: 18,
            seed_base: 1337,
        }
    }
}

impl LshConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> LshTrackResult<()> {
        if self.num_tables == 0 {
            return Err(LshTrackError::InvalidInput("num_tables must be at least 1"));
        }
        if self.key_bits == 0 || self.key_bits > 32 {
            return Err(LshTrackError::InvalidInput("key_bits must be in 1..=32"));
        }
        Ok(())
    }
}

/// Distance statistics sampled from the reference corpus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DescriptorStats {
    /// Mean Hamming distance between sampled row pairs.
    pub mean_dist: f32,
    /// Standard deviation of the sampled distances.
    pub std_dist: f32,
}

impl DescriptorStats {
    /// Used when the corpus has fewer than two rows.
    pub const FALLBACK: Self = Self {
        mean_dist: 128.0,
        std_dist: 32.0,
    };

    /// Samples up to 500 deterministic row pairs `(a, (a + n/2) % n)`.
    pub fn sample(corpus: DescriptorView<'_>) -> Self {
        let n = corpus.rows();
        if n < 2 {
            return Self::FALLBACK;
        }
        let samples = n.min(MAX_STATS_SAMPLES);
        let stride = (n / samples).max(1);
        let offset = n / 2;

        let mut dists = Vec::with_capacity(samples);
        for s in 0..samples {
            let a = (s * stride) % n;
            let b = (a + offset) % n;
            if let (Some(da), Some(db)) = (corpus.get(a), corpus.get(b)) {
                dists.push(hamming_distance(da, db) as f32);
            }
        }
        match mean_std(&dists) {
            Some((mean_dist, std_dist)) => Self {
                mean_dist,
                std_dist,
            },
            None => Self::FALLBACK,
        }
    }
}

/// Immutable multi-table LSH index.
#[derive(Clone, Debug)]
pub struct LshIndex {
    corpus: Vec<u8>,
    ref_rows: usize,
    tables: Vec<LshTable>,
    stats: DescriptorStats,
}

impl LshIndex {
    /// Builds an index over `ref_rows` descriptors stored in `corpus`.
    pub fn build(corpus: &[u8], ref_rows: usize, cfg: LshConfig) -> LshTrackResult<Self> {
        let view = DescriptorView::new(corpus, ref_rows)?;
        cfg.validate()?;

        let _span = trace_span!(
            "lsh_build",
            rows = ref_rows,
            tables = cfg.num_tables,
            key_bits = cfg.key_bits
        )
        .entered();

        let mut tables = Vec::with_capacity(cfg.num_tables);
        for t in 0..cfg.num_tables {
            let seed = cfg
                .seed_base
                .wrapping_add((t as u32).wrapping_mul(TABLE_SEED_STRIDE));
            let positions = BitPositionSampler::generate(cfg.key_bits, seed);
            let table = LshTable::build(positions, view);
            let stats = table.stats();
            trace_event!(
                "lsh_table",
                table = t,
                buckets = stats.buckets,
                max_bucket = stats.max_bucket
            );
            tables.push(table);
        }

        let stats = DescriptorStats::sample(view);
        trace_event!(
            "descriptor_stats",
            mean_dist = stats.mean_dist,
            std_dist = stats.std_dist
        );

        Ok(Self {
            corpus: corpus.to_vec(),
            ref_rows,
            tables,
            stats,
        })
    }

    /// Builds an index from a slice of descriptors.
    pub fn from_descriptors(descriptors: &[Descriptor], cfg: LshConfig) -> LshTrackResult<Self> {
        Self::build(descriptors.as_flattened(), descriptors.len(), cfg)
    }

    /// Returns the number of reference rows.
    pub fn ref_rows(&self) -> usize {
        self.ref_rows
    }

    /// Returns the hash tables in build order.
    pub fn tables(&self) -> &[LshTable] {
        &self.tables
    }

    /// Returns the sampled corpus distance statistics.
    pub fn stats(&self) -> DescriptorStats {
        self.stats
    }

    /// Returns a view of the reference corpus.
    pub fn corpus(&self) -> DescriptorView<'_> {
        DescriptorView::new_unchecked(&self.corpus, self.ref_rows)
    }

    /// Returns reference descriptor `row` if it exists.
    pub fn descriptor(&self, row: usize) -> Option<&Descriptor> {
        self.corpus().get(row)
    }

    /// Per-table bucket occupancy.
    pub fn table_stats(&self) -> Vec<TableStats> {
        self.tables.iter().map(LshTable::stats).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{DescriptorStats, LshConfig, LshIndex};
    use crate::descriptor::DescriptorView;
    use crate::util::LshTrackError;

    #[test]
    fn config_validation() {
        assert!(LshConfig::default().validate().is_ok());
        let bad = LshConfig {
            key_bits: 33,
            ..LshConfig::default()
        };
        assert!(matches!(bad.validate(), Err(LshTrackError::InvalidInput(_))));
        let bad = LshConfig {
            num_tables: 0,
            ..LshConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn stats_fallback_for_tiny_corpus() {
        let one = [[7u8; 32]];
        assert_eq!(
            DescriptorStats::sample(DescriptorView::from_descriptors(&one)),
            DescriptorStats::FALLBACK
        );
    }

    #[test]
    fn stats_for_complementary_pair() {
        let pair = [[0u8; 32], [0xFFu8; 32]];
        let stats = DescriptorStats::sample(DescriptorView::from_descriptors(&pair));
        assert!((stats.mean_dist - 256.0).abs() < 1e-6);
        assert!(stats.std_dist.abs() < 1e-6);
    }

    #[test]
    fn bucket_entries_are_valid_rows() {
        let corpus: Vec<[u8; 32]> = (0..40u8)
            .map(|i| {
                let mut d = [0u8; 32];
                for (j, b) in d.iter_mut().enumerate() {
                    *b = i.wrapping_mul(37).wrapping_add((j as u8).wrapping_mul(11));
                }
                d
            })
            .collect();
        let index = LshIndex::from_descriptors(&corpus, LshConfig::default()).unwrap();
        assert_eq!(index.tables().len(), 10);
        for table in index.tables() {
            assert_eq!(table.key_bits(), 18);
            let total: usize = table.buckets().map(|(_, rows)| rows.len()).sum();
            assert_eq!(total, 40);
            assert!(table
                .buckets()
                .all(|(_, rows)| rows.iter().all(|&r| (r as usize) < 40)));
        }
        assert_eq!(index.descriptor(3), Some(&corpus[3]));
        assert!(index.descriptor(40).is_none());
    }
}
