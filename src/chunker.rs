//! Partitioning of an axis into contiguous chunks.
//!
//! Chunks are index ranges, not copies. An aggregation reduces each chunk through a view of the
//! input, so no chunk is ever copied.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::array::LabeledArray;
use crate::error::EpiSummaryError;

/// How to partition an axis: by number of chunks or by maximum chunk size.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkRequest {
    /// Split into this many chunks
    Count(usize),
    /// Split into chunks of at most this many elements
    Size(usize),
}

impl ChunkRequest {
    /// Build a request from a pair of optional knobs, exactly one of which must be set.
    pub fn from_options(
        n_chunks: Option<usize>,
        chunk_size: Option<usize>,
    ) -> Result<Self, EpiSummaryError> {
        match (n_chunks, chunk_size) {
            (Some(n_chunks), None) => Ok(ChunkRequest::Count(n_chunks)),
            (None, Some(chunk_size)) => Ok(ChunkRequest::Size(chunk_size)),
            (Some(_), Some(_)) => Err(invalid("n_chunks and chunk_size are mutually exclusive")),
            (None, None) => Err(invalid("one of n_chunks or chunk_size is required")),
        }
    }
}

fn invalid(reason: &str) -> EpiSummaryError {
    EpiSummaryError::InvalidChunkRequest {
        reason: reason.to_string(),
    }
}

/// A contiguous sub-range of an axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in the partition
    pub index: usize,
    /// First index covered
    pub start: usize,
    /// One past the last index covered
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Lazy sequence of [Chunk] descriptors partitioning `[0, extent)`.
///
/// The first `extent % count` chunks hold one more element than the rest, so chunk sizes never
/// differ by more than one.
#[derive(Clone, Debug)]
pub struct Chunks {
    count: usize,
    base: usize,
    remainder: usize,
    next: usize,
    start: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next == self.count {
            return None;
        }
        let size = self.base + usize::from(self.next < self.remainder);
        let chunk = Chunk {
            index: self.next,
            start: self.start,
            end: self.start + size,
        };
        self.next += 1;
        self.start = chunk.end;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}

/// Partition `[0, extent)` according to `request`.
///
/// A chunk count larger than the extent is clamped so that no chunk is empty.
pub fn partition(extent: usize, request: ChunkRequest) -> Result<Chunks, EpiSummaryError> {
    if extent == 0 {
        return Err(invalid("cannot chunk an axis with zero extent"));
    }
    let count = match request {
        ChunkRequest::Count(0) => return Err(invalid("n_chunks must be greater than 0")),
        ChunkRequest::Size(0) => return Err(invalid("chunk_size must be greater than 0")),
        ChunkRequest::Count(n_chunks) => {
            if n_chunks > extent {
                tracing::debug!(n_chunks, extent, "clamping chunk count to axis extent");
            }
            n_chunks.min(extent)
        }
        ChunkRequest::Size(chunk_size) => extent.div_ceil(chunk_size),
    };
    Ok(Chunks {
        count,
        base: extent / count,
        remainder: extent % count,
        next: 0,
        start: 0,
    })
}

/// Partition the named axis of `array`.
///
/// # Arguments
///
/// * `array`: Array whose axis to partition
/// * `axis`: Axis name, usually `replicate`
/// * `request`: Chunk count or chunk size
pub fn make_chunks<T>(
    array: &LabeledArray<T>,
    axis: &str,
    request: ChunkRequest,
) -> Result<Chunks, EpiSummaryError> {
    partition(array.extent(axis)?, request)
}
