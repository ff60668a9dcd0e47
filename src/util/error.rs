//! Error types for lshtrack.

use thiserror::Error;

/// Result alias for lshtrack operations.
pub type LshTrackResult<T> = std::result::Result<T, LshTrackError>;

/// Errors surfaced at the index-build and match-call boundaries.
///
/// Absent matches and missing detections are regular outcomes and never
/// reported through this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LshTrackError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A descriptor buffer does not hold exactly `rows * 32` bytes.
    #[error("descriptor buffer holds {got} bytes, expected {expected} for {rows} rows")]
    DescriptorLength {
        rows: usize,
        expected: usize,
        got: usize,
    },
    /// An index is outside the valid range for the given context.
    #[error("index {index} out of bounds for {context} (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
}
