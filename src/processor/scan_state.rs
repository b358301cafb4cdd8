use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::trace;

use crate::processor::{EngineError, Result};

/// Counters shared by every worker of a scan.
///
/// `claim_index` and `result_count` only ever grow during a query, each
/// through a single fetch-and-add. `result_count` may run past
/// `result_capacity`; callers drop those writes but the count stays exact.
#[derive(Debug, Default)]
pub struct ScanState {
    claim_index: AtomicU32,
    row_count: AtomicU32,
    result_count: AtomicU32,
    result_capacity: AtomicU32,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-seeds the counters for a new query.
    ///
    /// Rejects combinations where a claim could wrap the 32-bit counter:
    /// every worker may overshoot `row_count` by one chunk before it stops.
    pub fn reset(
        &self,
        row_count: u32,
        result_capacity: u32,
        chunk_size: u32,
        workers: u32,
    ) -> Result<()> {
        let headroom = (chunk_size as u64) * (workers as u64 + 1);
        if row_count as u64 + headroom > u32::MAX as u64 {
            return Err(EngineError::InvalidQuery(format!(
                "{row_count} rows with chunk size {chunk_size} and {workers} workers overflow the claim counter"
            )));
        }

        self.claim_index.store(0, Ordering::Relaxed);
        self.row_count.store(row_count, Ordering::Relaxed);
        self.result_count.store(0, Ordering::Relaxed);
        self.result_capacity.store(result_capacity, Ordering::Relaxed);
        Ok(())
    }

    /// Hands out the next chunk, or `None` once every row has been claimed.
    #[inline]
    pub fn claim(&self, chunk_size: u32) -> Option<Range<u32>> {
        let start = self.claim_index.fetch_add(chunk_size, Ordering::Relaxed);
        let row_count = self.row_count.load(Ordering::Relaxed);
        if start >= row_count {
            return None;
        }
        let end = start.saturating_add(chunk_size).min(row_count);
        trace!(start, end, "claimed chunk");
        Some(start..end)
    }

    /// Counts one match and returns its slot if the result region has room.
    #[inline]
    pub fn record_result(&self) -> Option<u32> {
        let slot = self.result_count.fetch_add(1, Ordering::Relaxed);
        (slot < self.result_capacity.load(Ordering::Relaxed)).then_some(slot)
    }

    /// Counts one match without reserving a slot.
    #[inline]
    pub fn count_match(&self) {
        self.result_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn result_count(&self) -> u32 {
        self.result_count.load(Ordering::Relaxed)
    }

    pub fn result_capacity(&self) -> u32 {
        self.result_capacity.load(Ordering::Relaxed)
    }

    pub fn row_count(&self) -> u32 {
        self.row_count.load(Ordering::Relaxed)
    }

    /// Rows handed out so far, capped at the row count.
    pub fn rows_claimed(&self) -> u32 {
        self.claim_index
            .load(Ordering::Relaxed)
            .min(self.row_count.load(Ordering::Relaxed))
    }
}

/// Cooperative cancellation flag, checked by workers between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
