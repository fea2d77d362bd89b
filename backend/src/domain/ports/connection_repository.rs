//! Port for connection persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Connection, ConnectionId, DeletedConnection, NewConnection, SystemDisplay, SystemId,
    TokenGrant, UserId,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by connection repository adapters.
    pub enum ConnectionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } [transient] => "connection repository unavailable: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "connection repository query failed: {message}",
    }
}

/// Storage for [`Connection`] rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// The most recently updated active connection owned by `user`.
    async fn find_active_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError>;

    async fn find_by_id(
        &self,
        id: &ConnectionId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError>;

    /// Active connection for `system` owned by `user`.
    async fn find_for_user_and_system(
        &self,
        user: &UserId,
        system: &SystemId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError>;

    /// Any active connection for `system`, regardless of owner.
    async fn find_by_system(
        &self,
        system: &SystemId,
    ) -> Result<Option<Connection>, ConnectionRepositoryError>;

    async fn list_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Connection>, ConnectionRepositoryError>;

    /// Insert or re-activate the connection keyed by `(user, system)`.
    async fn upsert_authorized(
        &self,
        connection: &NewConnection,
    ) -> Result<Connection, ConnectionRepositoryError>;

    async fn update_tokens(
        &self,
        id: &ConnectionId,
        grant: &TokenGrant,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ConnectionRepositoryError>;

    async fn update_display(
        &self,
        id: &ConnectionId,
        display: &SystemDisplay,
    ) -> Result<(), ConnectionRepositoryError>;

    async fn mark_consumption_unavailable(
        &self,
        id: &ConnectionId,
    ) -> Result<(), ConnectionRepositoryError>;

    async fn mark_synced(
        &self,
        id: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), ConnectionRepositoryError>;

    /// Hard delete with cascade; reports how many dependent rows went with it.
    async fn delete(&self, id: &ConnectionId)
    -> Result<DeletedConnection, ConnectionRepositoryError>;
}
