//! Per-connection exclusion for sync runs within one process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::ConnectionId;

/// Tracks which connections are currently syncing.
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    active: Arc<Mutex<HashSet<ConnectionId>>>,
}

impl SyncGuard {
    /// Claim `connection`; `None` when a sync for it is already running.
    #[must_use]
    pub fn try_acquire(&self, connection: ConnectionId) -> Option<SyncPermit> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(connection).then(|| SyncPermit {
            active: Arc::clone(&self.active),
            connection,
        })
    }

    #[must_use]
    pub fn is_active(&self, connection: &ConnectionId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(connection)
    }
}

/// Releases the claim on drop.
#[derive(Debug)]
pub struct SyncPermit {
    active: Arc<Mutex<HashSet<ConnectionId>>>,
    connection: ConnectionId,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.connection);
    }
}
