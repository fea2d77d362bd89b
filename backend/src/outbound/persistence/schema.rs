//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Dashboard accounts.
    users (id) {
        id -> Uuid,
        email -> Varchar,
        /// `super_admin`, `admin` or `viewer`.
        role -> Varchar,
        /// Creating admin; set for viewers.
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Opaque bearer sessions, stored as SHA-256 hex digests.
    user_sessions (token_hash) {
        token_hash -> Varchar,
        user_id -> Uuid,
        expires_at -> Timestamptz,
        revoked_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// One row per `(user_id, system_id)` with the vendor OAuth tokens.
    connections (id) {
        id -> Uuid,
        user_id -> Uuid,
        system_id -> Varchar,
        access_token -> Text,
        refresh_token -> Text,
        token_expires_at -> Timestamptz,
        last_sync_at -> Nullable<Timestamptz>,
        is_active -> Bool,
        system_name -> Nullable<Varchar>,
        system_size_w -> Nullable<Int8>,
        timezone -> Nullable<Varchar>,
        consumption_unavailable -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Cached telemetry. Unique on `(connection_id, source, recorded_at, device_serial)`.
    production_records (id) {
        id -> Int8,
        connection_id -> Uuid,
        system_id -> Varchar,
        source -> Varchar,
        energy_wh -> Int8,
        power_w -> Int8,
        voltage -> Nullable<Float8>,
        current -> Nullable<Float8>,
        frequency -> Nullable<Float8>,
        power_factor -> Nullable<Float8>,
        /// Empty string for non-device rows.
        device_serial -> Varchar,
        recorded_at -> Timestamptz,
        interval_seconds -> Int4,
        metadata -> Jsonb,
    }
}

diesel::table! {
    /// Append-only vendor call log backing the monthly quota.
    api_call_logs (id) {
        id -> Int8,
        connection_id -> Uuid,
        service -> Varchar,
        endpoint -> Varchar,
        method -> Varchar,
        status_code -> Int4,
        success -> Bool,
        error_message -> Nullable<Text>,
        response_time_ms -> Nullable<Int8>,
        called_at -> Timestamptz,
    }
}

diesel::joinable!(user_sessions -> users (user_id));
diesel::joinable!(connections -> users (user_id));
diesel::joinable!(production_records -> connections (connection_id));
diesel::joinable!(api_call_logs -> connections (connection_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    user_sessions,
    connections,
    production_records,
    api_call_logs,
);
