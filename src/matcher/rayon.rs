//! Rayon-parallel matching (feature-gated).
//!
//! Live rows are distributed across workers with `map_init`, so every worker
//! owns a private [`CandidateScratch`]. The shared [`LshIndex`] is only read.
//! Output order and content are identical to the sequential path.

use crate::descriptor::DescriptorView;
use crate::lsh::LshIndex;
use crate::matcher::{match_one, CandidateScratch, Match, MatchConfig};
use crate::trace::{trace_event, trace_span};
use crate::util::LshTrackResult;
use rayon::prelude::*;

/// Matches a live batch of `live_rows` descriptors in parallel.
pub fn match_descriptors_par(
    index: &LshIndex,
    live: &[u8],
    live_rows: usize,
    cfg: &MatchConfig,
) -> LshTrackResult<Vec<Option<Match>>> {
    let live = DescriptorView::new(live, live_rows)?;
    match_view_par(index, live, cfg)
}

/// Matches a validated live batch in parallel.
pub fn match_view_par(
    index: &LshIndex,
    live: DescriptorView<'_>,
    cfg: &MatchConfig,
) -> LshTrackResult<Vec<Option<Match>>> {
    cfg.validate()?;
    let _span = trace_span!(
        "match_descriptors_par",
        live_rows = live.rows(),
        ref_rows = index.ref_rows()
    )
    .entered();

    let max_hamming = cfg.resolve_max_hamming(index);
    let queries = live.iter().as_slice();
    let matches: Vec<Option<Match>> = queries
        .par_iter()
        .enumerate()
        .map_init(
            || CandidateScratch::for_index(index),
            |scratch, (train_idx, query)| {
                match_one(index, query, train_idx, cfg, max_hamming, scratch)
            },
        )
        .collect();

    trace_event!(
        "match_summary",
        accepted = matches.iter().flatten().count(),
        max_hamming = max_hamming
    );
    Ok(matches)
}
