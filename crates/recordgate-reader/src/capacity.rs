//! Capacity limiting for concurrent reads

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of reads in flight on one reader.
///
/// A slot is taken when a read is accepted and released when the returned
/// permit is dropped, which for a reader is when its response writer goes
/// away. Acquisition never waits.
#[derive(Debug, Clone)]
pub struct CapacityLimiter {
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
}

/// Proof of an accepted read; releases its slot on drop
#[derive(Debug)]
pub struct ReadPermit {
    _permit: OwnedSemaphorePermit,
}

impl CapacityLimiter {
    /// Allow at most `max_in_flight` concurrent reads
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// No practical limit
    pub fn unbounded() -> Self {
        Self::new(Semaphore::MAX_PERMITS)
    }

    /// Take a slot if one is free
    pub fn try_acquire(&self) -> Option<ReadPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| ReadPermit { _permit: permit })
    }

    /// Reads currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.semaphore.available_permits()
    }

    /// Configured maximum
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

impl Default for CapacityLimiter {
    fn default() -> Self {
        Self::unbounded()
    }
}
