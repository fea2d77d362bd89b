//! Port counting manual refreshes per user and day.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::UserId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by refresh allowance stores.
    pub enum RefreshAllowanceStoreError {
        /// Backing store could not be reached.
        Unavailable { message: String } [transient] => "refresh allowance store unavailable: {message}",
    }
}

/// Process-external or in-memory counter store, injected at startup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshAllowanceStore: Send + Sync {
    /// Refreshes recorded for `(user, day)`.
    async fn count(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<u32, RefreshAllowanceStoreError>;

    /// Record one refresh and return the count for `(user, day)` including it.
    async fn increment(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<u32, RefreshAllowanceStoreError>;
}
