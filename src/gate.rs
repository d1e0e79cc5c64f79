//! Bounded admission control for running jobs.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::GateClosed;

/// Counts running jobs and makes the surplus wait.
///
/// Waiters are admitted in the order they called [`acquire`](Self::acquire).
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One occupied slot. The slot is freed when the permit is released or dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    pub fn release(self) {
        drop(self);
    }
}

impl ConcurrencyGate {
    /// A capacity of zero would deadlock every job, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot and occupy it.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}
