use crate::domain::workflow_instance::WorkflowInstanceId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-instance async mutexes
///
/// Entries are created on first use and dropped by [`InstanceLocks::release`]
/// once nobody holds or waits for them.
#[derive(Default)]
pub struct InstanceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InstanceLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the instance is free and take it
    pub async fn acquire(&self, id: &WorkflowInstanceId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id.0.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Forget the lock of an instance if it is idle
    pub fn release(&self, id: &WorkflowInstanceId) {
        self.locks
            .remove_if(&id.0, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of tracked instances
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no instance is tracked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
