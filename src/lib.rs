//! LshTrack matches 256-bit binary descriptors and stabilizes planar target
//! poses over time.
//!
//! The matcher hashes a reference corpus into several locality-sensitive
//! tables once, then matches each frame's live descriptors with multi-probe
//! lookup and a ratio test. The tracker fuses the resulting quadrilateral
//! detections with gyro rates through independent scalar Kalman filters.
//! Parallel matching is available via the `rayon` feature.

pub mod descriptor;
pub mod lowlevel;
pub mod lsh;
pub mod matcher;
mod trace;
pub mod tracker;
pub mod util;

pub use descriptor::{hamming_distance, Descriptor, DescriptorView, DESCRIPTOR_BYTES};
pub use lsh::{DescriptorStats, LshConfig, LshIndex};
pub use matcher::{aggregate_stats, match_descriptors, Match, MatchConfig, MatchStats, Matcher};
pub use tracker::{
    GyroSample, Point2, Quad, TemporalTracker, TrackerConfig, TrackerOutput, TrackingMode,
    Transform,
};
pub use util::{LshTrackError, LshTrackResult};

#[cfg(feature = "rayon")]
pub use matcher::rayon::match_descriptors_par;
