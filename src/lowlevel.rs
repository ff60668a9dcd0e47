//! Low-level building blocks for custom matching and tracking pipelines.
//!
//! These expose hash tables, candidate gathering and the individual filters
//! behind the high-level `Matcher` and `TemporalTracker` APIs. Most users
//! should prefer the top-level types.

pub use crate::descriptor::{descriptor_bit, POPCOUNT_TABLE};
pub use crate::lsh::{BitPositionSampler, Lcg, LshTable, TableStats};
pub use crate::matcher::{
    gather_candidates, match_one, match_view, nearest_pair, CandidateScratch, NearestPair,
};
pub use crate::tracker::{
    clamp_scale, max_corner_error, AccumulatedRotation, CenterFilter, FilterNoise,
    GyroIntegrator, RotationFilter, ScaleFilter,
};
