//! In-memory port implementations.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    ApiCallLogRepository, ApiCallLogRepositoryError, ConnectionRepository,
    ConnectionRepositoryError, CredentialResolver, CredentialResolverError,
    ProductionRecordRepository, ProductionRecordRepositoryError,
};
use crate::domain::{
    ApiCallLogEntry, AuthenticatedUser, Connection, ConnectionId, DeletedConnection,
    NewConnection, ProductionRecord, RecordId, RecordMetadata, RecordSource, StoredRecord,
    SystemDisplay, SystemId, TokenGrant, UserId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test store mutex"),
    }
}

/// Call log held in a vector.
#[derive(Default)]
pub struct InMemoryApiCallLog {
    entries: Mutex<Vec<ApiCallLogEntry>>,
}

impl InMemoryApiCallLog {
    pub fn entries(&self) -> Vec<ApiCallLogEntry> {
        lock(&self.entries).clone()
    }

    pub fn successes(&self) -> usize {
        lock(&self.entries).iter().filter(|entry| entry.success).count()
    }
}

#[async_trait]
impl ApiCallLogRepository for InMemoryApiCallLog {
    async fn append(&self, entry: &ApiCallLogEntry) -> Result<(), ApiCallLogRepositoryError> {
        lock(&self.entries).push(entry.clone());
        Ok(())
    }

    async fn count_since(
        &self,
        connection: &ConnectionId,
        since: DateTime<Utc>,
    ) -> Result<u64, ApiCallLogRepositoryError> {
        let count = lock(&self.entries)
            .iter()
            .filter(|entry| entry.connection_id == *connection && entry.timestamp >= since)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

/// Production rows with the storage dedup rule applied on insert.
#[derive(Default)]
pub struct InMemoryProductionRecords {
    rows: Mutex<Vec<StoredRecord>>,
}

impl InMemoryProductionRecords {
    /// Insert rows directly, skipping duplicates.
    pub fn seed(&self, rows: &[ProductionRecord]) -> u64 {
        let mut stored = lock(&self.rows);
        let mut inserted = 0;
        for row in rows {
            if stored.iter().any(|existing| existing.record.dedup_key() == row.dedup_key()) {
                continue;
            }
            let id = RecordId(i64::try_from(stored.len()).unwrap_or(i64::MAX) + 1);
            stored.push(StoredRecord {
                id,
                record: row.clone(),
            });
            inserted += 1;
        }
        inserted
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_source(&self, connection: ConnectionId, source: RecordSource) -> usize {
        self.rows_for(connection, source).len()
    }

    /// Rows of `source`, oldest first.
    pub fn rows_for(&self, connection: ConnectionId, source: RecordSource) -> Vec<ProductionRecord> {
        let mut rows: Vec<ProductionRecord> = lock(&self.rows)
            .iter()
            .filter(|row| row.record.connection_id == connection && row.record.source == source)
            .map(|row| row.record.clone())
            .collect();
        rows.sort_by_key(|row| row.timestamp);
        rows
    }

    /// Most recent summary row.
    pub fn latest(&self, connection: ConnectionId) -> Option<StoredRecord> {
        lock(&self.rows)
            .iter()
            .filter(|row| {
                row.record.connection_id == connection && row.record.source == RecordSource::Summary
            })
            .max_by_key(|row| (row.record.timestamp, row.id.0))
            .cloned()
    }
}

#[async_trait]
impl ProductionRecordRepository for InMemoryProductionRecords {
    async fn insert_batch(
        &self,
        rows: &[ProductionRecord],
    ) -> Result<u64, ProductionRecordRepositoryError> {
        Ok(self.seed(rows))
    }

    async fn latest_snapshot(
        &self,
        connection: &ConnectionId,
    ) -> Result<Option<StoredRecord>, ProductionRecordRepositoryError> {
        Ok(self.latest(*connection))
    }

    async fn first_snapshot_since(
        &self,
        connection: &ConnectionId,
        since: DateTime<Utc>,
    ) -> Result<Option<StoredRecord>, ProductionRecordRepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| {
                row.record.connection_id == *connection
                    && row.record.source == RecordSource::Summary
                    && row.record.timestamp >= since
            })
            .min_by_key(|row| (row.record.timestamp, row.id.0))
            .cloned())
    }

    async fn update_snapshot(
        &self,
        id: RecordId,
        power_w: Option<i64>,
        metadata: &RecordMetadata,
    ) -> Result<(), ProductionRecordRepositoryError> {
        let mut rows = lock(&self.rows);
        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Err(ProductionRecordRepositoryError::query(format!(
                "no row with id {}",
                id.0
            )));
        };
        if let Some(power_w) = power_w {
            row.record.power_w = power_w;
        }
        row.record.metadata = metadata.clone();
        Ok(())
    }

    async fn list_in_span(
        &self,
        connection: &ConnectionId,
        source: RecordSource,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, ProductionRecordRepositoryError> {
        let mut rows: Vec<StoredRecord> = lock(&self.rows)
            .iter()
            .filter(|row| {
                row.record.connection_id == *connection
                    && row.record.source == source
                    && row.record.timestamp >= from
                    && row.record.timestamp < until
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.record.timestamp);
        Ok(rows)
    }
}

/// Connections keyed by id; insertion order stands in for recency.
#[derive(Default)]
pub struct InMemoryConnections {
    connections: Mutex<Vec<Connection>>,
}

impl InMemoryConnections {
    pub fn insert(&self, connection: Connection) {
        lock(&self.connections).push(connection);
    }

    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        lock(&self.connections)
            .iter()
            .find(|connection| connection.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(
        &self,
        id: &ConnectionId,
        change: impl FnOnce(&mut Connection),
    ) -> Result<(), ConnectionRepositoryError> {
        let mut connections = lock(&self.connections);
        let Some(position) = connections.iter().position(|connection| connection.id == *id) else {
            return Err(ConnectionRepositoryError::query(format!("no connection {id}")));
        };
        let mut connection = connections.remove(position);
        change(&mut connection);
        connections.push(connection);
        Ok(())
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn find_active_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        Ok(lock(&self.connections)
            .iter()
            .rev()
            .find(|connection| connection.user_id == *user && connection.is_active)
            .cloned())
    }

    async fn find_by_id(
        &self,
        id: &ConnectionId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        Ok(self.get(*id))
    }

    async fn find_for_user_and_system(
        &self,
        user: &UserId,
        system: &SystemId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        Ok(lock(&self.connections)
            .iter()
            .find(|connection| {
                connection.user_id == *user
                    && connection.system_id == *system
                    && connection.is_active
            })
            .cloned())
    }

    async fn find_by_system(
        &self,
        system: &SystemId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError> {
        Ok(lock(&self.connections)
            .iter()
            .rev()
            .find(|connection| connection.system_id == *system && connection.is_active)
            .cloned())
    }

    async fn list_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Connection>, ConnectionRepositoryError> {
        Ok(lock(&self.connections)
            .iter()
            .rev()
            .filter(|connection| connection.user_id == *user)
            .cloned()
            .collect())
    }

    async fn upsert_authorized(
        &self,
        new: &NewConnection,
    ) -> Result<Connection, ConnectionRepositoryError> {
        let existing = lock(&self.connections)
            .iter()
            .find(|connection| {
                connection.user_id == new.user_id && connection.system_id == new.system_id
            })
            .map(|connection| connection.id);
        if let Some(id) = existing {
            self.update(&id, |connection| {
                connection.access_token = new.grant.access_token.clone();
                connection.refresh_token = new.grant.refresh_token.clone();
                connection.token_expires_at = new.token_expires_at;
                connection.display = new.display.clone();
                connection.is_active = true;
            })?;
            return self
                .get(id)
                .ok_or_else(|| ConnectionRepositoryError::query("upserted row vanished"));
        }
        let connection = Connection {
            id: ConnectionId::random(),
            user_id: new.user_id,
            system_id: new.system_id.clone(),
            access_token: new.grant.access_token.clone(),
            refresh_token: new.grant.refresh_token.clone(),
            token_expires_at: new.token_expires_at,
            last_sync_at: None,
            is_active: true,
            display: new.display.clone(),
            consumption_unavailable: false,
            created_at: Utc::now(),
        };
        self.insert(connection.clone());
        Ok(connection)
    }

    async fn update_tokens(
        &self,
        id: &ConnectionId,
        grant: &TokenGrant,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ConnectionRepositoryError> {
        self.update(id, |connection| {
            connection.access_token = grant.access_token.clone();
            connection.refresh_token = grant.refresh_token.clone();
            connection.token_expires_at = expires_at;
        })
    }

    async fn update_display(
        &self,
        id: &ConnectionId,
        display: &SystemDisplay,
    ) -> Result<(), ConnectionRepositoryError> {
        self.update(id, |connection| {
            connection.display = connection.display.merged(display);
        })
    }

    async fn mark_consumption_unavailable(
        &self,
        id: &ConnectionId,
    ) -> Result<(), ConnectionRepositoryError> {
        self.update(id, |connection| connection.consumption_unavailable = true)
    }

    async fn mark_synced(
        &self,
        id: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), ConnectionRepositoryError> {
        self.update(id, |connection| connection.last_sync_at = Some(at))
    }

    async fn delete(
        &self,
        id: &ConnectionId,
    ) -> Result<DeletedConnection, ConnectionRepositoryError> {
        let mut connections = lock(&self.connections);
        let before = connections.len();
        connections.retain(|connection| connection.id != *id);
        if connections.len() == before {
            return Err(ConnectionRepositoryError::query(format!("no connection {id}")));
        }
        Ok(DeletedConnection::default())
    }
}

/// Bearer strings mapped straight to users.
#[derive(Default)]
pub struct InMemoryCredentials {
    users: Mutex<HashMap<String, AuthenticatedUser>>,
}

impl InMemoryCredentials {
    pub fn grant(&self, bearer: &str, user: AuthenticatedUser) {
        lock(&self.users).insert(bearer.to_owned(), user);
    }
}

#[async_trait]
impl CredentialResolver for InMemoryCredentials {
    async fn resolve(
        &self,
        bearer: &str,
    ) -> Result<Option<AuthenticatedUser>, CredentialResolverError> {
        Ok(lock(&self.users).get(bearer).cloned())
    }
}
