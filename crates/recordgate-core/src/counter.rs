//! Audit counters shared between a reader and its caller

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Counter value meaning rule application was bypassed and nothing was counted
pub const NOT_COUNTED: i64 = -1;

/// A shared, atomically updated record counter.
///
/// Cloning yields another handle to the same count. The caller owns the
/// counter and typically scopes one pair (processed, returned) per request.
#[derive(Debug, Clone, Default)]
pub struct RecordCounter {
    inner: Arc<AtomicI64>,
}

impl RecordCounter {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to the count.
    ///
    /// A counter holding [`NOT_COUNTED`] stays there.
    pub fn increment(&self) {
        let _ = self
            .inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != NOT_COUNTED).then_some(current + 1)
            });
    }

    /// Mark the count as bypassed
    pub fn mark_not_counted(&self) {
        self.inner.store(NOT_COUNTED, Ordering::Release);
    }

    /// Current value
    pub fn get(&self) -> i64 {
        self.inner.load(Ordering::Acquire)
    }

    /// Whether the count was bypassed
    pub fn is_not_counted(&self) -> bool {
        self.get() == NOT_COUNTED
    }
}
