//! Port for cached telemetry rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ConnectionId, ProductionRecord, RecordId, RecordMetadata, RecordSource, StoredRecord};

use super::define_port_error;

define_port_error! {
    /// Errors raised by production record repository adapters.
    pub enum ProductionRecordRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } [transient] => "production record repository unavailable: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "production record query failed: {message}",
        /// Stored metadata could not be encoded or decoded.
        Serialization { message: String } => "production record metadata invalid: {message}",
    }
}

/// Storage for [`ProductionRecord`] rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductionRecordRepository: Send + Sync {
    /// Insert rows, skipping any whose dedup key already exists.
    ///
    /// Returns the number of rows actually inserted.
    async fn insert_batch(
        &self,
        rows: &[ProductionRecord],
    ) -> Result<u64, ProductionRecordRepositoryError>;

    /// Most recent `summary` row.
    async fn latest_snapshot(
        &self,
        connection: &ConnectionId,
    ) -> Result<Option<StoredRecord>, ProductionRecordRepositoryError>;

    /// Earliest `summary` row at or after `since`.
    async fn first_snapshot_since(
        &self,
        connection: &ConnectionId,
        since: DateTime<Utc>,
    ) -> Result<Option<StoredRecord>, ProductionRecordRepositoryError>;

    /// Overwrite power (when supplied) and metadata of an existing row.
    async fn update_snapshot(
        &self,
        id: RecordId,
        power_w: Option<i64>,
        metadata: &RecordMetadata,
    ) -> Result<(), ProductionRecordRepositoryError>;

    /// Rows of `source` with `from <= timestamp < until`, oldest first.
    async fn list_in_span(
        &self,
        connection: &ConnectionId,
        source: RecordSource,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, ProductionRecordRepositoryError>;
}
