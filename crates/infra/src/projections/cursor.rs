//! Per-stream projection cursors.
//!
//! Each projection tracks the last processed sequence number per aggregate
//! stream. Replays at or below the cursor are skipped, which makes
//! projections idempotent under at-least-once delivery; clearing the cursors
//! supports deterministic rebuilds.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use vetledger_core::AggregateId;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Decision for one incoming envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDecision {
    /// New event; apply it, then call [`StreamCursors::advance`].
    Apply,
    /// Duplicate or replay at or below the cursor; skip silently.
    Skip,
}

/// In-memory cursor table, one entry per aggregate stream.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate an incoming sequence number against the stream cursor.
    ///
    /// The first event of a stream may carry any positive sequence number;
    /// after that, strictly contiguous increments are required. Gaps mean
    /// lost events and poison the read model, so they fail loudly.
    pub fn check(&self, aggregate_id: AggregateId, seq: u64) -> Result<CursorDecision, CursorError> {
        let last = self
            .inner
            .read()
            .ok()
            .and_then(|m| m.get(&aggregate_id).copied())
            .unwrap_or(0);

        if seq == 0 {
            return Err(CursorError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorDecision::Skip);
        }
        if last != 0 && seq != last + 1 {
            return Err(CursorError::NonMonotonicSequence { last, found: seq });
        }
        Ok(CursorDecision::Apply)
    }

    /// Advance the cursor after a successful apply.
    pub fn advance(&self, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(aggregate_id, seq);
        }
    }

    /// Forget all cursors (rebuild support).
    pub fn clear(&self) {
        if let Ok(mut m) = self.inner.write() {
            m.clear();
        }
    }
}
