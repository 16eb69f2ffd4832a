//! Rate limiter — process-local gate on batch pulls.
//!
//! Holds a coarse estimate of how many queue items are in flight. A batch pull
//! is refused once the estimate reaches the ceiling; the caller skips that
//! cycle entirely and back-off comes from the cadence, not from waiting here.
//!
//! Only the batch processor writes the estimate. The health surface reads it.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Point-in-time view for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub estimate: usize,
    pub ceiling: usize,
}

/// Single-writer in-flight estimate with a fixed ceiling.
#[derive(Debug)]
pub struct RateLimiter {
    estimate: AtomicUsize,
    ceiling: usize,
}

impl RateLimiter {
    pub fn new(ceiling: usize) -> Self {
        Self {
            estimate: AtomicUsize::new(0),
            ceiling,
        }
    }

    /// Whether a batch of `requested` records may be pulled.
    ///
    /// Refused iff the current estimate is at or above the ceiling.
    pub fn admit(&self, requested: usize) -> bool {
        let estimate = self.estimate();
        let allowed = estimate < self.ceiling;

        if !allowed {
            tracing::debug!(
                estimate,
                ceiling = self.ceiling,
                requested,
                "Batch pull refused, rate limit reached"
            );
        }

        allowed
    }

    /// Record the size of a freshly fetched batch as the new estimate.
    pub fn set_estimate(&self, fetched: usize) {
        self.estimate.store(fetched, Ordering::SeqCst);
    }

    /// Subtract `completed` from the estimate, floored at zero. Returns the new estimate.
    pub fn release(&self, completed: usize) -> usize {
        let previous = self
            .estimate
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(completed))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_sub(completed)
    }

    pub fn estimate(&self) -> usize {
        self.estimate.load(Ordering::SeqCst)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            estimate: self.estimate(),
            ceiling: self.ceiling,
        }
    }
}
