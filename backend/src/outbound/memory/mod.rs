//! Process-local adapters.
//!
//! Counters held here reset when the process restarts and are not shared
//! between replicas.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::UserId;
use crate::domain::ports::{RefreshAllowanceStore, RefreshAllowanceStoreError};

/// Refresh counters keyed by user and day.
///
/// Entries for days other than the one being written are pruned on write, so
/// the map holds at most one day per user.
#[derive(Debug, Default)]
pub struct InMemoryRefreshAllowanceStore {
    counts: Mutex<HashMap<(UserId, NaiveDate), u32>>,
}

#[async_trait]
impl RefreshAllowanceStore for InMemoryRefreshAllowanceStore {
    async fn count(&self, user: &UserId, day: NaiveDate) -> Result<u32, RefreshAllowanceStoreError> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(counts.get(&(*user, day)).copied().unwrap_or(0))
    }

    async fn increment(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<u32, RefreshAllowanceStoreError> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.retain(|(_, counted_day), _| *counted_day == day);
        let count = counts.entry((*user, day)).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }
}
