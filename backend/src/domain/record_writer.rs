//! Persistence Writer: idempotent row inserts and in-place snapshot
//! enrichment.
//!
//! A connection's snapshot moves from none, to base (a summary row exists),
//! to enriched (later steps merged counters into it). Enrichment never
//! creates a row.

use std::sync::Arc;

use tracing::debug;

use crate::domain::ports::ProductionRecordRepository;
use crate::domain::{ConnectionId, ProductionRecord, SnapshotPatch, SyncError};

/// Writes fetch results through the production record port.
#[derive(Clone)]
pub struct RecordWriter {
    records: Arc<dyn ProductionRecordRepository>,
}

impl RecordWriter {
    pub fn new(records: Arc<dyn ProductionRecordRepository>) -> Self {
        Self { records }
    }

    /// Insert rows, skipping duplicates on the dedup key.
    ///
    /// Returns the number of rows that were new.
    pub async fn write_batch(&self, rows: &[ProductionRecord]) -> Result<u64, SyncError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = self.records.insert_batch(rows).await?;
        debug!(
            candidates = rows.len(),
            inserted,
            source = %rows.first().map(|row| row.source.as_str()).unwrap_or_default(),
            "wrote production rows"
        );
        Ok(inserted)
    }

    /// Append a point-in-time summary row.
    pub async fn record_snapshot(&self, snapshot: ProductionRecord) -> Result<u64, SyncError> {
        self.write_batch(std::slice::from_ref(&snapshot)).await
    }

    /// Merge `patch` into the latest summary row.
    ///
    /// Returns `false` without writing when there is no snapshot yet or the
    /// patch is empty.
    pub async fn enrich_snapshot(
        &self,
        connection: &ConnectionId,
        patch: &SnapshotPatch,
    ) -> Result<bool, SyncError> {
        if patch.is_empty() {
            return Ok(false);
        }
        let Some(latest) = self.records.latest_snapshot(connection).await? else {
            debug!(connection_id = %connection, "no snapshot to enrich");
            return Ok(false);
        };
        let merged = latest.record.metadata.merged_with(patch);
        self.records
            .update_snapshot(latest.id, patch.power_w, &merged)
            .await?;
        Ok(true)
    }
}
