//! Internal Diesel row structs.
//!
//! These types never leave the persistence layer; repositories convert them
//! to and from domain types at the port boundary.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{api_call_logs, connections, production_records, users};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub role: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = connections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ConnectionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub system_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub system_name: Option<String>,
    pub system_size_w: Option<i64>,
    pub timezone: Option<String>,
    pub consumption_unavailable: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert half of the `(user_id, system_id)` upsert.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = connections)]
pub(crate) struct NewConnectionRow<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub system_id: &'a str,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    pub token_expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub system_name: Option<&'a str>,
    pub system_size_w: Option<i64>,
    pub timezone: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = production_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ProductionRecordRow {
    pub id: i64,
    pub connection_id: Uuid,
    pub system_id: String,
    pub source: String,
    pub energy_wh: i64,
    pub power_w: i64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub frequency: Option<f64>,
    pub power_factor: Option<f64>,
    pub device_serial: String,
    pub recorded_at: DateTime<Utc>,
    pub interval_seconds: i32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = production_records)]
pub(crate) struct NewProductionRecordRow<'a> {
    pub connection_id: Uuid,
    pub system_id: &'a str,
    pub source: &'static str,
    pub energy_wh: i64,
    pub power_w: i64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub frequency: Option<f64>,
    pub power_factor: Option<f64>,
    pub device_serial: &'a str,
    pub recorded_at: DateTime<Utc>,
    pub interval_seconds: i32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = api_call_logs)]
pub(crate) struct NewApiCallLogRow<'a> {
    pub connection_id: Uuid,
    pub service: &'static str,
    pub endpoint: &'a str,
    pub method: &'static str,
    pub status_code: i32,
    pub success: bool,
    pub error_message: Option<&'a str>,
    pub response_time_ms: Option<i64>,
    pub called_at: DateTime<Utc>,
}
