//! PostgreSQL-backed `ApiCallLogRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ApiCallLogRepository, ApiCallLogRepositoryError};
use crate::domain::{ApiCallLogEntry, ConnectionId};

use super::diesel_helpers::{map_diesel_error, map_pool_error, row_count};
use super::models::NewApiCallLogRow;
use super::pool::DbPool;
use super::schema::api_call_logs;

/// Vendor tag written to every row.
const SERVICE: &str = "enphase";

/// Diesel-backed vendor call log.
#[derive(Clone)]
pub struct DieselApiCallLogRepository {
    pool: DbPool,
}

impl DieselApiCallLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_new_row(entry: &ApiCallLogEntry) -> NewApiCallLogRow<'_> {
    NewApiCallLogRow {
        connection_id: *entry.connection_id.as_uuid(),
        service: SERVICE,
        endpoint: entry.endpoint.as_str(),
        method: entry.method,
        status_code: i32::from(entry.status_code),
        success: entry.success,
        error_message: entry.error_message.as_deref(),
        response_time_ms: entry.response_time_ms,
        called_at: entry.timestamp,
    }
}

#[async_trait]
impl ApiCallLogRepository for DieselApiCallLogRepository {
    async fn append(&self, entry: &ApiCallLogEntry) -> Result<(), ApiCallLogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(api_call_logs::table)
            .values(&to_new_row(entry))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn count_since(
        &self,
        connection: &ConnectionId,
        since: DateTime<Utc>,
    ) -> Result<u64, ApiCallLogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let count: i64 = api_call_logs::table
            .filter(api_call_logs::connection_id.eq(connection.as_uuid()))
            .filter(api_call_logs::called_at.ge(since))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row_count(count))
    }
}
