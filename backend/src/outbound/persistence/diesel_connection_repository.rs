//! PostgreSQL-backed `ConnectionRepository`.
//!
//! Tokens are stored as issued; the table is only reachable from the
//! backend's database role.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::{ConnectionRepository, ConnectionRepositoryError};
use crate::domain::{
    Connection, ConnectionId, DeletedConnection, NewConnection, SecretToken, SystemDisplay,
    SystemId, TokenGrant, UserId,
};

use super::diesel_helpers::{map_diesel_error, map_pool_error, row_count};
use super::models::{ConnectionRow, NewConnectionRow};
use super::pool::DbPool;
use super::schema::{api_call_logs, connections, production_records};

/// Diesel-backed connection storage.
#[derive(Clone)]
pub struct DieselConnectionRepository {
    pool: DbPool,
}

impl DieselConnectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn ensure_updated(updated: usize, id: &ConnectionId) -> Result<(), ConnectionRepositoryError> {
    if updated == 0 {
        return Err(ConnectionRepositoryError::query(format!(
            "connection {id} not found"
        )));
    }
    Ok(())
}

fn row_to_connection(row: ConnectionRow) -> Result<Connection, ConnectionRepositoryError> {
    let corrupt = |field: &str| {
        warn!(connection_id = %row.id, field, "stored connection failed validation");
        ConnectionRepositoryError::query(format!("stored connection has invalid {field}"))
    };
    let system_id = SystemId::new(row.system_id.as_str()).map_err(|_| corrupt("system_id"))?;
    let access_token =
        SecretToken::new(row.access_token.as_str()).map_err(|_| corrupt("access_token"))?;
    let refresh_token =
        SecretToken::new(row.refresh_token.as_str()).map_err(|_| corrupt("refresh_token"))?;

    Ok(Connection {
        id: ConnectionId::from_uuid(row.id),
        user_id: UserId::from_uuid(row.user_id),
        system_id,
        access_token,
        refresh_token,
        token_expires_at: row.token_expires_at,
        last_sync_at: row.last_sync_at,
        is_active: row.is_active,
        display: SystemDisplay {
            name: row.system_name,
            size_w: row.system_size_w,
            timezone: row.timezone,
        },
        consumption_unavailable: row.consumption_unavailable,
        created_at: row.created_at,
    })
}

fn rows_to_connections(
    rows: Vec<ConnectionRow>,
) -> Result<Vec<Connection>, ConnectionRepositoryError> {
    rows.into_iter().map(row_to_connection).collect()
}

#[async_trait]
impl ConnectionRepository for DieselConnectionRepository {
    async fn find_active_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = connections::table
            .filter(connections::user_id.eq(user.as_uuid()))
            .filter(connections::is_active.eq(true))
            .order(connections::updated_at.desc())
            .select(ConnectionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_connection).transpose()
    }

    async fn find_by_id(
        &self,
        id: &ConnectionId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = connections::table
            .find(id.as_uuid())
            .select(ConnectionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_connection).transpose()
    }

    async fn find_for_user_and_system(
        &self,
        user: &UserId,
        system: &SystemId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = connections::table
            .filter(connections::user_id.eq(user.as_uuid()))
            .filter(connections::system_id.eq(system.as_str()))
            .filter(connections::is_active.eq(true))
            .select(ConnectionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_connection).transpose()
    }

    async fn find_by_system(
        &self,
        system: &SystemId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = connections::table
            .filter(connections::system_id.eq(system.as_str()))
            .filter(connections::is_active.eq(true))
            .order(connections::updated_at.desc())
            .select(ConnectionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_connection).transpose()
    }

    async fn list_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Connection>, ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = connections::table
            .filter(connections::user_id.eq(user.as_uuid()))
            .order(connections::created_at.asc())
            .select(ConnectionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_connections(rows)
    }

    async fn upsert_authorized(
        &self,
        connection: &NewConnection,
    ) -> Result<Connection, ConnectionRepositoryError> {
        let now = Utc::now();
        let row = NewConnectionRow {
            id: Uuid::new_v4(),
            user_id: *connection.user_id.as_uuid(),
            system_id: connection.system_id.as_str(),
            access_token: connection.grant.access_token.expose(),
            refresh_token: connection.grant.refresh_token.expose(),
            token_expires_at: connection.token_expires_at,
            is_active: true,
            system_name: connection.display.name.as_deref(),
            system_size_w: connection.display.size_w,
            timezone: connection.display.timezone.as_deref(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored = diesel::insert_into(connections::table)
            .values(&row)
            .on_conflict((connections::user_id, connections::system_id))
            .do_update()
            .set((
                connections::access_token.eq(excluded(connections::access_token)),
                connections::refresh_token.eq(excluded(connections::refresh_token)),
                connections::token_expires_at.eq(excluded(connections::token_expires_at)),
                connections::is_active.eq(true),
                connections::system_name.eq(excluded(connections::system_name)),
                connections::system_size_w.eq(excluded(connections::system_size_w)),
                connections::timezone.eq(excluded(connections::timezone)),
                connections::updated_at.eq(excluded(connections::updated_at)),
            ))
            .returning(ConnectionRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_connection(stored)
    }

    async fn update_tokens(
        &self,
        id: &ConnectionId,
        grant: &TokenGrant,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(connections::table.find(id.as_uuid()))
            .set((
                connections::access_token.eq(grant.access_token.expose()),
                connections::refresh_token.eq(grant.refresh_token.expose()),
                connections::token_expires_at.eq(expires_at),
                connections::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        ensure_updated(updated, id)
    }

    async fn update_display(
        &self,
        id: &ConnectionId,
        display: &SystemDisplay,
    ) -> Result<(), ConnectionRepositoryError> {
        let Some(current) = self.find_by_id(id).await? else {
            return Err(ConnectionRepositoryError::query(format!(
                "connection {id} not found"
            )));
        };
        let merged = current.display.merged(display);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(connections::table.find(id.as_uuid()))
            .set((
                connections::system_name.eq(merged.name),
                connections::system_size_w.eq(merged.size_w),
                connections::timezone.eq(merged.timezone),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        ensure_updated(updated, id)
    }

    async fn mark_consumption_unavailable(
        &self,
        id: &ConnectionId,
    ) -> Result<(), ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(connections::table.find(id.as_uuid()))
            .set(connections::consumption_unavailable.eq(true))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        ensure_updated(updated, id)
    }

    async fn mark_synced(
        &self,
        id: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), ConnectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(connections::table.find(id.as_uuid()))
            .set((
                connections::last_sync_at.eq(Some(at)),
                connections::updated_at.eq(at),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        ensure_updated(updated, id)
    }

    async fn delete(
        &self,
        id: &ConnectionId,
    ) -> Result<DeletedConnection, ConnectionRepositoryError> {
        let key = *id.as_uuid();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let counts = conn
            .transaction(|conn| {
                async move {
                    let production: i64 = production_records::table
                        .filter(production_records::connection_id.eq(key))
                        .count()
                        .get_result(conn)
                        .await?;
                    let calls: i64 = api_call_logs::table
                        .filter(api_call_logs::connection_id.eq(key))
                        .count()
                        .get_result(conn)
                        .await?;
                    let removed = diesel::delete(connections::table.find(key))
                        .execute(conn)
                        .await?;
                    Ok::<_, diesel::result::Error>((removed, production, calls))
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        let (removed, production, calls) = counts;
        ensure_updated(removed, id)?;
        Ok(DeletedConnection {
            production_records: row_count(production),
            api_call_logs: row_count(calls),
        })
    }
}
