//! Per-document async locks.
//!
//! Writers for one document id are serialized; writers for different ids
//! never contend. Slots are created on first use and dropped again once the
//! last holder or waiter lets go.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default, Clone)]
pub struct DocumentLocks {
    slots: Slots,
}

/// Exclusive hold on one document id.
#[derive(Debug)]
pub struct DocumentLockGuard {
    document_id: String,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `document_id`.
    pub async fn lock(&self, document_id: &str) -> DocumentLockGuard {
        let slot = self
            .slots
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .clone();

        // Built before awaiting so a cancelled wait still releases the slot.
        let mut held = DocumentLockGuard {
            document_id: document_id.to_string(),
            slot: slot.clone(),
            guard: None,
            slots: self.slots.clone(),
        };
        held.guard = Some(slot.lock_owned().await);
        held
    }

    /// Number of ids with a live slot.
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for DocumentLockGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut slots = self.slots.lock();
        // One reference in the map, one here: nobody else holds or waits.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.document_id);
        }
    }
}
