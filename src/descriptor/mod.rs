//! Fixed-length binary descriptors and borrowed descriptor batches.
//!
//! A batch is a contiguous byte buffer holding `rows` descriptors of
//! [`DESCRIPTOR_BYTES`] bytes each, row-major, with no padding. Rows are
//! identified only by their index, which stays stable for the lifetime of the
//! buffer.

mod hamming;

pub use hamming::{hamming_distance, POPCOUNT_TABLE};

use crate::util::{LshTrackError, LshTrackResult};

/// Number of bytes in one binary descriptor.
pub const DESCRIPTOR_BYTES: usize = 32;

/// Number of bits in one binary descriptor.
pub const DESCRIPTOR_BITS: usize = DESCRIPTOR_BYTES * 8;

/// A single 256-bit binary descriptor.
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// Borrowed view over a contiguous batch of descriptors.
#[derive(Copy, Clone, Debug)]
pub struct DescriptorView<'a> {
    data: &'a [u8],
    rows: usize,
}

impl<'a> DescriptorView<'a> {
    /// Creates a view, requiring `data.len() == rows * 32` exactly.
    pub fn new(data: &'a [u8], rows: usize) -> LshTrackResult<Self> {
        let expected = rows
            .checked_mul(DESCRIPTOR_BYTES)
            .ok_or(LshTrackError::InvalidInput("descriptor row count overflows"))?;
        if data.len() != expected {
            return Err(LshTrackError::DescriptorLength {
                rows,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, rows })
    }

    /// Creates a view whose length invariant the caller already checked.
    pub(crate) fn new_unchecked(data: &'a [u8], rows: usize) -> Self {
        debug_assert_eq!(data.len(), rows * DESCRIPTOR_BYTES);
        Self { data, rows }
    }

    /// Creates a view over a slice of descriptors.
    pub fn from_descriptors(descriptors: &'a [Descriptor]) -> Self {
        Self {
            data: descriptors.as_flattened(),
            rows: descriptors.len(),
        }
    }

    /// Returns the number of descriptors.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns true if the batch holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Returns the backing byte slice.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Returns descriptor `row` if it is within bounds.
    pub fn get(&self, row: usize) -> Option<&'a Descriptor> {
        let start = row.checked_mul(DESCRIPTOR_BYTES)?;
        let end = start.checked_add(DESCRIPTOR_BYTES)?;
        self.data.get(start..end)?.try_into().ok()
    }

    /// Returns descriptor `row` or an out-of-bounds error.
    pub fn row(&self, row: usize) -> LshTrackResult<&'a Descriptor> {
        self.get(row).ok_or(LshTrackError::IndexOutOfBounds {
            index: row,
            len: self.rows,
            context: "descriptor row",
        })
    }

    /// Iterates descriptors in row order.
    pub fn iter(&self) -> std::slice::Iter<'a, Descriptor> {
        let (rows, _) = self.data.as_chunks::<DESCRIPTOR_BYTES>();
        rows.iter()
    }
}

/// Reads bit `pos` (0..256) of a descriptor, least-significant bit first.
#[inline]
pub fn descriptor_bit(desc: &Descriptor, pos: u16) -> bool {
    let pos = pos as usize;
    (desc[pos >> 3] >> (pos & 7)) & 1 == 1
}
