//! PostgreSQL-backed `ProductionRecordRepository`.
//!
//! Inserts rely on the `production_records_dedup_key` unique constraint with
//! `ON CONFLICT DO NOTHING`, so replays and overlapping windows are no-ops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ProductionRecordRepository, ProductionRecordRepositoryError};
use crate::domain::{
    ConnectionId, ElectricalReadings, ProductionRecord, RecordId, RecordMetadata, RecordSource,
    StoredRecord, SystemId,
};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::models::{NewProductionRecordRow, ProductionRecordRow};
use super::pool::DbPool;
use super::schema::production_records;

/// Rows per INSERT; keeps bind parameters under the PostgreSQL limit.
const INSERT_CHUNK_ROWS: usize = 1_000;

/// Diesel-backed telemetry storage.
#[derive(Clone)]
pub struct DieselProductionRecordRepository {
    pool: DbPool,
}

impl DieselProductionRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn encode_metadata(
    metadata: &RecordMetadata,
) -> Result<serde_json::Value, ProductionRecordRepositoryError> {
    serde_json::to_value(metadata)
        .map_err(|error| ProductionRecordRepositoryError::serialization(error.to_string()))
}

fn to_new_row(
    record: &ProductionRecord,
) -> Result<NewProductionRecordRow<'_>, ProductionRecordRepositoryError> {
    Ok(NewProductionRecordRow {
        connection_id: *record.connection_id.as_uuid(),
        system_id: record.system_id.as_str(),
        source: record.source.as_str(),
        energy_wh: record.energy_wh,
        power_w: record.power_w,
        voltage: record.electrical.voltage,
        current: record.electrical.current,
        frequency: record.electrical.frequency,
        power_factor: record.electrical.power_factor,
        device_serial: record.device_serial.as_deref().unwrap_or_default(),
        recorded_at: record.timestamp,
        interval_seconds: record.interval_seconds,
        metadata: encode_metadata(&record.metadata)?,
    })
}

fn row_to_stored(row: ProductionRecordRow) -> Result<StoredRecord, ProductionRecordRepositoryError> {
    let source = row
        .source
        .parse::<RecordSource>()
        .map_err(|error| ProductionRecordRepositoryError::query(error.to_string()))?;
    let system_id = SystemId::new(row.system_id)
        .map_err(|_| ProductionRecordRepositoryError::query("stored row has a blank system id"))?;
    let metadata: RecordMetadata = serde_json::from_value(row.metadata)
        .map_err(|error| ProductionRecordRepositoryError::serialization(error.to_string()))?;
    let device_serial = Some(row.device_serial).filter(|serial| !serial.is_empty());

    Ok(StoredRecord {
        id: RecordId(row.id),
        record: ProductionRecord {
            connection_id: ConnectionId::from_uuid(row.connection_id),
            system_id,
            source,
            energy_wh: row.energy_wh,
            power_w: row.power_w,
            electrical: ElectricalReadings {
                voltage: row.voltage,
                current: row.current,
                frequency: row.frequency,
                power_factor: row.power_factor,
            },
            device_serial,
            timestamp: row.recorded_at,
            interval_seconds: row.interval_seconds,
            metadata,
        },
    })
}

#[async_trait]
impl ProductionRecordRepository for DieselProductionRecordRepository {
    async fn insert_batch(
        &self,
        rows: &[ProductionRecord],
    ) -> Result<u64, ProductionRecordRepositoryError> {
        let new_rows = rows
            .iter()
            .map(to_new_row)
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut inserted = 0_u64;
        for chunk in new_rows.chunks(INSERT_CHUNK_ROWS) {
            let count = diesel::insert_into(production_records::table)
                .values(chunk)
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            inserted += u64::try_from(count).unwrap_or_default();
        }
        Ok(inserted)
    }

    async fn latest_snapshot(
        &self,
        connection: &ConnectionId,
    ) -> Result<Option<StoredRecord>, ProductionRecordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = production_records::table
            .filter(production_records::connection_id.eq(connection.as_uuid()))
            .filter(production_records::source.eq(RecordSource::Summary.as_str()))
            .order((
                production_records::recorded_at.desc(),
                production_records::id.desc(),
            ))
            .select(ProductionRecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_stored).transpose()
    }

    async fn first_snapshot_since(
        &self,
        connection: &ConnectionId,
        since: DateTime<Utc>,
    ) -> Result<Option<StoredRecord>, ProductionRecordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = production_records::table
            .filter(production_records::connection_id.eq(connection.as_uuid()))
            .filter(production_records::source.eq(RecordSource::Summary.as_str()))
            .filter(production_records::recorded_at.ge(since))
            .order((
                production_records::recorded_at.asc(),
                production_records::id.asc(),
            ))
            .select(ProductionRecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_stored).transpose()
    }

    async fn update_snapshot(
        &self,
        id: RecordId,
        power_w: Option<i64>,
        metadata: &RecordMetadata,
    ) -> Result<(), ProductionRecordRepositoryError> {
        let encoded = encode_metadata(metadata)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let target = production_records::table.find(id.0);
        let updated = match power_w {
            Some(power) => diesel::update(target)
                .set((
                    production_records::power_w.eq(power),
                    production_records::metadata.eq(encoded),
                ))
                .execute(&mut conn)
                .await,
            None => diesel::update(target)
                .set(production_records::metadata.eq(encoded))
                .execute(&mut conn)
                .await,
        }
        .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(ProductionRecordRepositoryError::query(format!(
                "snapshot row {} not found",
                id.0
            )));
        }
        Ok(())
    }

    async fn list_in_span(
        &self,
        connection: &ConnectionId,
        source: RecordSource,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, ProductionRecordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = production_records::table
            .filter(production_records::connection_id.eq(connection.as_uuid()))
            .filter(production_records::source.eq(source.as_str()))
            .filter(production_records::recorded_at.ge(from))
            .filter(production_records::recorded_at.lt(until))
            .order(production_records::recorded_at.asc())
            .select(ProductionRecordRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_stored).collect()
    }
}
