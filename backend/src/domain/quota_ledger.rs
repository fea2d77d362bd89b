//! Quota Ledger: the record of every vendor call.
//!
//! Writes are fire-and-forget. A failed append is logged and dropped so the
//! sync that made the call carries on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use mockable::Clock;
use tracing::{debug, warn};

use crate::domain::calendar::month_start_in;
use crate::domain::ports::{ApiCallLogRepository, VendorApiError};
use crate::domain::{ConnectionId, SyncError};

/// Calls per connection per month the vendor plan allows by default.
pub const DEFAULT_MONTHLY_LIMIT: u64 = 1_000;

/// One vendor call, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCallLogEntry {
    pub connection_id: ConnectionId,
    pub endpoint: String,
    pub method: &'static str,
    pub status_code: u16,
    pub success: bool,
    pub error_message: Option<String>,
    pub response_time_ms: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl ApiCallLogEntry {
    /// Entry for a call that returned a usable response.
    #[must_use]
    pub fn succeeded(
        connection_id: ConnectionId,
        endpoint: String,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            endpoint,
            method: "GET",
            status_code: 200,
            success: true,
            error_message: None,
            response_time_ms: Some(millis(latency)),
            timestamp,
        }
    }

    /// Entry for a failed call; the status is zero when no response arrived.
    #[must_use]
    pub fn failed(
        connection_id: ConnectionId,
        endpoint: String,
        error: &VendorApiError,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            endpoint,
            method: "GET",
            status_code: error.status_code(),
            success: false,
            error_message: Some(error.to_string()),
            response_time_ms: Some(millis(latency)),
            timestamp,
        }
    }
}

fn millis(latency: Duration) -> i64 {
    i64::try_from(latency.as_millis()).unwrap_or(i64::MAX)
}

/// Calls made this month against the configured soft limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    pub used: u64,
    pub limit: u64,
}

impl QuotaUsage {
    #[must_use]
    pub fn remaining(self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

/// Records vendor calls and answers monthly usage questions.
#[derive(Clone)]
pub struct QuotaLedger {
    repository: Arc<dyn ApiCallLogRepository>,
    clock: Arc<dyn Clock>,
    reference_offset: FixedOffset,
    monthly_limit: u64,
}

impl QuotaLedger {
    /// Ledger measuring months in UTC with the default limit.
    pub fn new(repository: Arc<dyn ApiCallLogRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            reference_offset: Utc.fix(),
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
        }
    }

    /// Measure calendar months in `offset` instead of UTC.
    #[must_use]
    pub fn with_reference_offset(mut self, offset: FixedOffset) -> Self {
        self.reference_offset = offset;
        self
    }

    #[must_use]
    pub fn with_monthly_limit(mut self, limit: u64) -> Self {
        self.monthly_limit = limit;
        self
    }

    /// Append an entry. Never fails.
    pub async fn log_call(&self, entry: ApiCallLogEntry) {
        debug!(
            connection_id = %entry.connection_id,
            endpoint = %entry.endpoint,
            status = entry.status_code,
            success = entry.success,
            response_time_ms = ?entry.response_time_ms,
            "vendor call"
        );
        if let Err(error) = self.repository.append(&entry).await {
            warn!(
                connection_id = %entry.connection_id,
                endpoint = %entry.endpoint,
                %error,
                "failed to record vendor call"
            );
        }
    }

    /// Entries since the first instant of the current calendar month.
    pub async fn count_calls_this_month(&self, connection: &ConnectionId) -> Result<u64, SyncError> {
        let since = month_start_in(self.clock.utc(), self.reference_offset);
        self.repository
            .count_since(connection, since)
            .await
            .map_err(|error| SyncError::Persistence {
                message: error.to_string(),
            })
    }

    /// Count plus the configured soft limit.
    pub async fn usage(&self, connection: &ConnectionId) -> Result<QuotaUsage, SyncError> {
        Ok(QuotaUsage {
            used: self.count_calls_this_month(connection).await?,
            limit: self.monthly_limit,
        })
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }
}
