//! Ratio-test descriptor matching against an [`LshIndex`].
//!
//! Every live descriptor is matched independently: candidates are gathered
//! from the index buckets, ranked by exact Hamming distance, and the nearest
//! reference row is accepted only if it clearly beats the runner-up and falls
//! under an absolute distance threshold. The output is index-aligned with the
//! live batch, with `None` for rejected rows.

mod candidates;
#[cfg(feature = "rayon")]
pub mod rayon;

pub use candidates::{gather_candidates, nearest_pair, CandidateScratch, NearestPair};

use crate::descriptor::{Descriptor, DescriptorView};
use crate::lsh::LshIndex;
use crate::trace::{trace_event, trace_span};
use crate::util::math::median_sorted;
use crate::util::{LshTrackError, LshTrackResult};

/// Floor of the threshold derived from corpus statistics.
const MIN_DERIVED_MAX_HAMMING: u32 = 48;

/// Fraction of the mean corpus distance used as the derived threshold.
const DERIVED_MAX_HAMMING_FRACTION: f32 = 0.4;

/// Configuration for descriptor matching.
#[derive(Clone, Debug)]
pub struct MatchConfig {
    /// Maximum number of candidate rows examined per live descriptor.
    pub max_candidates: usize,
    /// Lowe ratio: accept when `best < ratio * second`.
    pub ratio: f32,
    /// Absolute distance threshold; derived from corpus statistics when `None`.
    pub max_hamming: Option<u32>,
    /// Probe buckets one bit-flip away from the exact bucket.
    pub use_multi_probe: bool,
    /// Number of low hash bits flipped, one at a time, when probing.
    pub multi_probe_flip_bits: usize,
    /// Widest key for which multi-probe is applied.
    pub multi_probe_max_key_bits: usize,
    /// Match live descriptors in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_candidates: 600,
            ratio: 0.75,
            max_hamming: None,
            use_multi_probe: true,
            multi_probe_flip_bits: 3,
            multi_probe_max_key_bits: 20,
            parallel: false,
        }
    }
}

impl MatchConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> LshTrackResult<()> {
        if self.max_candidates == 0 {
            return Err(LshTrackError::InvalidInput(
                "max_candidates must be at least 1",
            ));
        }
        if !self.ratio.is_finite() || self.ratio <= 0.0 || self.ratio > 1.0 {
            return Err(LshTrackError::InvalidInput("ratio must be in (0, 1]"));
        }
        if self.multi_probe_flip_bits > 32 {
            return Err(LshTrackError::InvalidInput(
                "multi_probe_flip_bits must be at most 32",
            ));
        }
        Ok(())
    }

    /// Resolves the absolute acceptance threshold for `index`.
    pub fn resolve_max_hamming(&self, index: &LshIndex) -> u32 {
        self.max_hamming.unwrap_or_else(|| {
            let derived = (index.stats().mean_dist * DERIVED_MAX_HAMMING_FRACTION).floor();
            MIN_DERIVED_MAX_HAMMING.max(derived as u32)
        })
    }
}

/// Accepted correspondence between a reference row and a live row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Row in the reference corpus.
    pub query_idx: usize,
    /// Row in the live batch.
    pub train_idx: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Distance summary over accepted matches.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MatchStats {
    /// Number of accepted matches.
    pub count: usize,
    /// Mean distance.
    pub mean_dist: f32,
    /// Smallest distance.
    pub min_dist: u32,
    /// Largest distance.
    pub max_dist: u32,
    /// Median distance.
    pub median_dist: f32,
}

/// Summarizes accepted matches; all fields are zero when none were accepted.
pub fn aggregate_stats(matches: &[Option<Match>]) -> MatchStats {
    let mut dists: Vec<u32> = matches.iter().flatten().map(|m| m.distance).collect();
    if dists.is_empty() {
        return MatchStats::default();
    }
    dists.sort_unstable();
    let count = dists.len();
    let sum: u64 = dists.iter().map(|&d| d as u64).sum();
    MatchStats {
        count,
        mean_dist: sum as f32 / count as f32,
        min_dist: dists[0],
        max_dist: dists[count - 1],
        median_dist: median_sorted(&dists).unwrap_or(0.0),
    }
}

/// Applies the ratio and distance tests to a nearest pair.
pub(crate) fn accept(
    pair: NearestPair,
    train_idx: usize,
    ratio: f32,
    max_hamming: u32,
) -> Option<Match> {
    let (best_row, best) = pair.best?;
    let (second_row, second) = pair.second?;
    if second_row == best_row {
        return None;
    }
    if (best as f32) < ratio * second as f32 && best <= max_hamming {
        Some(Match {
            query_idx: best_row,
            train_idx,
            distance: best,
        })
    } else {
        None
    }
}

/// Matches one live descriptor using caller-owned scratch.
pub fn match_one(
    index: &LshIndex,
    query: &Descriptor,
    train_idx: usize,
    cfg: &MatchConfig,
    max_hamming: u32,
    scratch: &mut CandidateScratch,
) -> Option<Match> {
    let candidates = gather_candidates(index, query, cfg, scratch);
    let pair = nearest_pair(index, query, candidates);
    accept(pair, train_idx, cfg.ratio, max_hamming)
}

/// Matches every live descriptor sequentially.
pub fn match_descriptors(
    index: &LshIndex,
    live: &[u8],
    live_rows: usize,
    cfg: &MatchConfig,
) -> LshTrackResult<Vec<Option<Match>>> {
    let live = DescriptorView::new(live, live_rows)?;
    match_view(index, live, cfg)
}

/// Matches a validated live batch sequentially.
pub fn match_view(
    index: &LshIndex,
    live: DescriptorView<'_>,
    cfg: &MatchConfig,
) -> LshTrackResult<Vec<Option<Match>>> {
    cfg.validate()?;
    let _span = trace_span!(
        "match_descriptors",
        live_rows = live.rows(),
        ref_rows = index.ref_rows()
    )
    .entered();

    let max_hamming = cfg.resolve_max_hamming(index);
    let mut scratch = CandidateScratch::for_index(index);
    let matches: Vec<Option<Match>> = live
        .iter()
        .enumerate()
        .map(|(train_idx, query)| {
            match_one(index, query, train_idx, cfg, max_hamming, &mut scratch)
        })
        .collect();

    trace_event!(
        "match_summary",
        accepted = matches.iter().flatten().count(),
        max_hamming = max_hamming
    );
    Ok(matches)
}

/// High-level matcher owning an index and its configuration.
#[derive(Clone, Debug)]
pub struct Matcher {
    index: LshIndex,
    cfg: MatchConfig,
}

impl Matcher {
    /// Creates a matcher with the default configuration.
    pub fn new(index: LshIndex) -> Self {
        Self {
            index,
            cfg: MatchConfig::default(),
        }
    }

    /// Replaces the match configuration.
    pub fn with_config(mut self, cfg: MatchConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Returns the underlying index.
    pub fn index(&self) -> &LshIndex {
        &self.index
    }

    /// Returns the match configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    /// Matches a live batch of `live_rows` descriptors.
    ///
    /// Uses the parallel path when `parallel` is set and the `rayon` feature is
    /// enabled; both paths produce identical output.
    pub fn match_batch(
        &self,
        live: &[u8],
        live_rows: usize,
    ) -> LshTrackResult<Vec<Option<Match>>> {
        let view = DescriptorView::new(live, live_rows)?;
        self.match_view(view)
    }

    /// Matches a validated live batch.
    pub fn match_view(&self, live: DescriptorView<'_>) -> LshTrackResult<Vec<Option<Match>>> {
        #[cfg(feature = "rayon")]
        if self.cfg.parallel {
            return self::rayon::match_view_par(&self.index, live, &self.cfg);
        }
        match_view(&self.index, live, &self.cfg)
    }

    /// Matches a slice of descriptors.
    pub fn match_descriptors(&self, live: &[Descriptor]) -> LshTrackResult<Vec<Option<Match>>> {
        self.match_view(DescriptorView::from_descriptors(live))
    }
}

#[cfg(test)]
mod tests {
    use super::{accept, aggregate_stats, Match, MatchConfig, MatchStats, NearestPair};

    #[test]
    fn accept_requires_ratio_and_threshold() {
        let pair = NearestPair {
            best: Some((3, 10)),
            second: Some((7, 20)),
        };
        assert_eq!(
            accept(pair, 1, 0.75, 48),
            Some(Match {
                query_idx: 3,
                train_idx: 1,
                distance: 10,
            })
        );
        assert_eq!(accept(pair, 1, 0.5, 48), None);
        assert_eq!(accept(pair, 1, 0.75, 9), None);

        let lonely = NearestPair {
            best: Some((3, 0)),
            second: None,
        };
        assert_eq!(accept(lonely, 0, 0.75, 48), None);

        let tie = NearestPair {
            best: Some((5, 0)),
            second: Some((9, 0)),
        };
        assert_eq!(accept(tie, 0, 0.75, 48), None);
    }

    #[test]
    fn stats_over_accepted_only() {
        let m = |d| {
            Some(Match {
                query_idx: 0,
                train_idx: 0,
                distance: d,
            })
        };
        let stats = aggregate_stats(&[m(4), None, m(10), m(2), None, m(6)]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min_dist, 2);
        assert_eq!(stats.max_dist, 10);
        assert!((stats.mean_dist - 5.5).abs() < 1e-6);
        assert!((stats.median_dist - 5.0).abs() < 1e-6);

        assert_eq!(aggregate_stats(&[None, None]), MatchStats::default());
    }

    #[test]
    fn config_validation() {
        assert!(MatchConfig::default().validate().is_ok());
        for ratio in [0.0, -0.5, 1.5, f32::NAN] {
            let cfg = MatchConfig {
                ratio,
                ..MatchConfig::default()
            };
            assert!(cfg.validate().is_err());
        }
        let cfg = MatchConfig {
            max_candidates: 0,
            ..MatchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
