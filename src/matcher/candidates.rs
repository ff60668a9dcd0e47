//! Per-query candidate gathering and nearest/second-nearest selection.

use crate::descriptor::{hamming_distance, Descriptor};
use crate::lsh::LshIndex;
use crate::matcher::MatchConfig;

/// Reusable scratch for one in-flight query.
///
/// The `seen` flags span every reference row but are only cleared for the
/// rows recorded in `candidates`, so resetting costs the number of candidates
/// touched rather than the corpus size. A scratch must never be shared between
/// concurrent queries.
#[derive(Clone, Debug)]
pub struct CandidateScratch {
    seen: Vec<bool>,
    candidates: Vec<u32>,
}

impl CandidateScratch {
    /// Creates scratch sized for a corpus of `ref_rows` rows.
    pub fn new(ref_rows: usize) -> Self {
        Self {
            seen: vec![false; ref_rows],
            candidates: Vec::new(),
        }
    }

    /// Creates scratch sized for `index`.
    pub fn for_index(index: &LshIndex) -> Self {
        Self::new(index.ref_rows())
    }

    /// Returns the candidates gathered by the last call to [`gather_candidates`].
    pub fn candidates(&self) -> &[u32] {
        &self.candidates
    }

    fn clear(&mut self) {
        for &row in &self.candidates {
            if let Some(flag) = self.seen.get_mut(row as usize) {
                *flag = false;
            }
        }
        self.candidates.clear();
    }

    /// Adds unseen rows from `bucket` until `cap` candidates are held.
    fn extend_from(&mut self, bucket: &[u32], cap: usize) {
        for &row in bucket {
            if self.candidates.len() >= cap {
                return;
            }
            if let Some(flag) = self.seen.get_mut(row as usize) {
                if !*flag {
                    *flag = true;
                    self.candidates.push(row);
                }
            }
        }
    }
}

/// Collects reference rows sharing a bucket with `query` in any table.
///
/// Gathering runs in two passes over the tables. The first reads every
/// table's exact bucket. With multi-probe enabled, the second reads, for each
/// table with a narrow enough key, the buckets one bit-flip away on the lowest
/// `multi_probe_flip_bits` hash bits. Both passes stop once `max_candidates`
/// rows are held, so the exact-bucket candidates are always a prefix of the
/// probed ones.
pub fn gather_candidates<'s>(
    index: &LshIndex,
    query: &Descriptor,
    cfg: &MatchConfig,
    scratch: &'s mut CandidateScratch,
) -> &'s [u32] {
    scratch.clear();
    if scratch.seen.len() < index.ref_rows() {
        scratch.seen.resize(index.ref_rows(), false);
    }
    let cap = cfg.max_candidates;

    for table in index.tables() {
        if scratch.candidates.len() >= cap {
            return &scratch.candidates;
        }
        scratch.extend_from(table.bucket(table.hash(query)), cap);
    }

    if !cfg.use_multi_probe {
        return &scratch.candidates;
    }
    for table in index.tables() {
        if table.key_bits() > cfg.multi_probe_max_key_bits {
            continue;
        }
        let key = table.hash(query);
        let flips = cfg.multi_probe_flip_bits.min(table.key_bits());
        for bit in 0..flips {
            if scratch.candidates.len() >= cap {
                return &scratch.candidates;
            }
            scratch.extend_from(table.bucket(key ^ (1 << bit)), cap);
        }
    }
    &scratch.candidates
}

/// Best and second-best candidates by Hamming distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NearestPair {
    /// Closest row and its distance.
    pub best: Option<(usize, u32)>,
    /// Runner-up row (distinct from `best`) and its distance.
    pub second: Option<(usize, u32)>,
}

/// Scans candidate rows and keeps the two closest. Earlier rows win ties.
pub fn nearest_pair(index: &LshIndex, query: &Descriptor, candidates: &[u32]) -> NearestPair {
    let mut pair = NearestPair::default();
    for &row in candidates {
        let row = row as usize;
        let Some(reference) = index.descriptor(row) else {
            continue;
        };
        let dist = hamming_distance(query, reference);
        match pair.best {
            Some((_, best)) if dist >= best => {
                if pair.second.is_none_or(|(_, second)| dist < second) {
                    pair.second = Some((row, dist));
                }
            }
            _ => {
                pair.second = pair.best;
                pair.best = Some((row, dist));
            }
        }
    }
    pair
}
