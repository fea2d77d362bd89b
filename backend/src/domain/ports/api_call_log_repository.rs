//! Port for the vendor call log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ApiCallLogEntry, ConnectionId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by call log adapters.
    pub enum ApiCallLogRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } [transient] => "call log unavailable: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "call log query failed: {message}",
    }
}

/// Append-only storage for [`ApiCallLogEntry`] rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiCallLogRepository: Send + Sync {
    async fn append(&self, entry: &ApiCallLogEntry) -> Result<(), ApiCallLogRepositoryError>;

    /// Entries for `connection` with `timestamp >= since`.
    async fn count_since(
        &self,
        connection: &ConnectionId,
        since: DateTime<Utc>,
    ) -> Result<u64, ApiCallLogRepositoryError>;
}
