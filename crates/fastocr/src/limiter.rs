//! Admission gate bounding how many OCR processes run at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate with a fixed capacity.
///
/// Waiting happens on the calling task only. Waiters are admitted in FIFO
/// order, which is the order jobs called [`ExecutionLimiter::acquire`].
#[derive(Debug, Clone)]
pub struct ExecutionLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted execution. Dropping it releases the slot, whatever the
/// outcome of the execution was.
#[derive(Debug)]
pub struct ExecutionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionLimiter {
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of executions currently admitted.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    pub async fn acquire(&self) -> ExecutionPermit {
        // The semaphore is owned here and never closed.
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("execution limiter semaphore closed"),
        };
        ExecutionPermit { _permit: permit }
    }

    pub fn try_acquire(&self) -> Option<ExecutionPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| ExecutionPermit { _permit: permit })
    }
}
