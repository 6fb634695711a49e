use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per payment id
///
/// Lifecycle operations on the same payment run one at a time; different
/// payments never wait on each other. Entries are dropped once no one holds
/// or waits on them.
#[derive(Debug, Default)]
pub struct PaymentLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one lifecycle operation
pub struct PaymentLockGuard {
    id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PaymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, payment_id: &str) -> PaymentLockGuard {
        let mutex = self
            .locks
            .entry(payment_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        PaymentLockGuard {
            id: payment_id.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Ids with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for PaymentLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // only the map itself still references the mutex
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
