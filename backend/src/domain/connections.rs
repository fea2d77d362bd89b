//! Connection onboarding and lifecycle.
//!
//! The OAuth `state` parameter carries the initiating user's id; the callback
//! trusts it to pick the owner of the new connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{info, warn};

use crate::domain::ports::{ConnectionRepository, MonitoringApi, OAuthClient, VendorSystem};
use crate::domain::{
    AuthenticatedUser, Connection, ConnectionId, DeletedConnection, Error, NewConnection,
    SecretToken, SyncError, SystemId, UserId,
};

/// Page size used when listing the vendor account's systems.
pub const SYSTEMS_PAGE_SIZE: u32 = 100;

/// Onboarding, listing, and removal of vendor connections.
#[derive(Clone)]
pub struct ConnectionService {
    connections: Arc<dyn ConnectionRepository>,
    oauth: Arc<dyn OAuthClient>,
    api: Arc<dyn MonitoringApi>,
    clock: Arc<dyn Clock>,
}

impl ConnectionService {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        oauth: Arc<dyn OAuthClient>,
        api: Arc<dyn MonitoringApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            oauth,
            api,
            clock,
        }
    }

    /// Vendor consent URL for `user`.
    pub fn authorization_url(&self, user: &AuthenticatedUser) -> Result<String, Error> {
        user.require_writer()?;
        self.oauth
            .authorization_url(&user.id.to_string())
            .map_err(|error| Error::from(SyncError::from(error)))
    }

    /// Exchange `code`, pick the account's first system, and store the
    /// connection for `owner`.
    pub async fn complete_authorization(
        &self,
        owner: UserId,
        code: &str,
    ) -> Result<Connection, Error> {
        if code.trim().is_empty() {
            return Err(Error::invalid_request("authorization code is missing"));
        }
        let grant = self.oauth.exchange_code(code).await.map_err(|error| {
            warn!(user_id = %owner, %error, "authorization code exchange failed");
            SyncError::from(error)
        })?;
        let issued_at = self.clock.utc();
        let systems = self.list_systems(&grant.access_token).await?;
        let Some(first) = systems.into_iter().next() else {
            return Err(Error::not_found("the vendor account has no systems"));
        };
        let connection = self
            .connections
            .upsert_authorized(&NewConnection {
                user_id: owner,
                system_id: first.system_id,
                token_expires_at: grant.expires_at(issued_at),
                grant,
                display: first.display,
            })
            .await
            .map_err(SyncError::from)?;
        info!(
            user_id = %owner,
            connection_id = %connection.id,
            system_id = %connection.system_id,
            "vendor connection authorised"
        );
        Ok(connection)
    }

    /// Every system visible to the token, following pages until `total`.
    async fn list_systems(&self, token: &SecretToken) -> Result<Vec<VendorSystem>, SyncError> {
        let mut systems = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.api.systems(token, page, SYSTEMS_PAGE_SIZE).await?;
            let received = batch.systems.len();
            systems.extend(batch.systems);
            if received == 0 || u64::try_from(systems.len()).unwrap_or(u64::MAX) >= batch.total {
                return Ok(systems);
            }
            page += 1;
        }
    }

    /// Connections visible to `user`, newest first.
    pub async fn list(&self, user: &AuthenticatedUser) -> Result<Vec<Connection>, Error> {
        Ok(self
            .connections
            .list_for_user(&user.data_owner())
            .await
            .map_err(SyncError::from)?)
    }

    /// Latest sync instant across the connections `user` reads.
    pub async fn check_updates(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        let connections = self.list(user).await?;
        Ok(connections
            .iter()
            .filter_map(|connection| connection.last_sync_at)
            .max())
    }

    /// A connection `user` may sync or delete.
    pub async fn writable(
        &self,
        user: &AuthenticatedUser,
        id: &ConnectionId,
    ) -> Result<Connection, Error> {
        user.require_writer()?;
        let connection = self
            .connections
            .find_by_id(id)
            .await
            .map_err(SyncError::from)?
            .ok_or_else(|| Error::not_found("connection not found"))?;
        if connection.user_id != user.id && !user.is_super_admin() {
            return Err(Error::forbidden("connection belongs to another user"));
        }
        Ok(connection)
    }

    /// The connection `user` reads data from.
    ///
    /// Super admins may name any system. Everyone else is scoped to the
    /// data owner's connections.
    pub async fn readable(
        &self,
        user: &AuthenticatedUser,
        system: Option<&SystemId>,
    ) -> Result<Connection, Error> {
        let owner = user.data_owner();
        let found = match system {
            Some(system) if user.is_super_admin() => {
                self.connections.find_by_system(system).await
            }
            Some(system) => self.connections.find_for_user_and_system(&owner, system).await,
            None => self.connections.find_active_for_user(&owner).await,
        };
        found
            .map_err(SyncError::from)?
            .ok_or_else(|| Error::not_found("no active connection found"))
    }

    /// Remove a connection with its rows and call log.
    pub async fn disconnect(
        &self,
        user: &AuthenticatedUser,
        id: &ConnectionId,
    ) -> Result<DeletedConnection, Error> {
        let connection = self.writable(user, id).await?;
        let deleted = self
            .connections
            .delete(&connection.id)
            .await
            .map_err(SyncError::from)?;
        info!(
            connection_id = %connection.id,
            production_records = deleted.production_records,
            api_call_logs = deleted.api_call_logs,
            "connection deleted"
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ports::{MockConnectionRepository, VendorApiError, VendorEndpoint};
    use crate::domain::{ErrorCode, SystemDisplay, UserRole};
    use crate::test_support::{
        InMemoryConnections, MutableClock, StubMonitoringApi, StubOAuthClient,
        connection_fixture, user_fixture,
    };
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 2, 9, 30, 0).single().expect("instant")
    }

    fn system(id: &str) -> VendorSystem {
        VendorSystem {
            system_id: SystemId::new(id).expect("system"),
            display: SystemDisplay {
                name: Some(format!("System {id}")),
                size_w: None,
                timezone: None,
            },
        }
    }

    fn service(
        connections: Arc<dyn ConnectionRepository>,
        api: Arc<StubMonitoringApi>,
    ) -> ConnectionService {
        ConnectionService::new(
            connections,
            Arc::new(StubOAuthClient::default()),
            api,
            Arc::new(MutableClock::new(now())),
        )
    }

    #[tokio::test]
    async fn authorization_stores_first_system_of_paged_listing() {
        let systems: Vec<VendorSystem> = (1..=150).map(|n| system(&n.to_string())).collect();
        let api = Arc::new(StubMonitoringApi::new(now().date_naive()).with_systems(systems));
        let connections = Arc::new(InMemoryConnections::default());
        let service = service(connections.clone(), api.clone());
        let owner = UserId::random();

        let connection = service
            .complete_authorization(owner, "auth-code")
            .await
            .expect("authorised");

        assert_eq!(connection.system_id.as_str(), "1");
        assert_eq!(connection.user_id, owner);
        assert_eq!(connection.token_expires_at, now() + chrono::TimeDelta::days(1));
        assert_eq!(api.count(VendorEndpoint::Systems), 2);
        assert_eq!(connections.len(), 1);
    }

    #[tokio::test]
    async fn reauthorising_updates_the_existing_connection() {
        let api = Arc::new(StubMonitoringApi::new(now().date_naive()).with_systems(vec![system("9")]));
        let connections = Arc::new(InMemoryConnections::default());
        let service = service(connections.clone(), api);
        let owner = UserId::random();

        let first = service.complete_authorization(owner, "a").await.expect("first");
        let second = service.complete_authorization(owner, "b").await.expect("second");

        assert_eq!(first.id, second.id);
        assert_eq!(second.access_token.expose(), "access-2");
        assert_eq!(connections.len(), 1);
    }

    #[tokio::test]
    async fn account_without_systems_is_not_found() {
        let api = Arc::new(StubMonitoringApi::new(now().date_naive()));
        let service = service(Arc::new(InMemoryConnections::default()), api);

        let error = service
            .complete_authorization(UserId::random(), "code")
            .await
            .expect_err("no systems");
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn rejected_code_is_a_bad_gateway() {
        let oauth = StubOAuthClient::default();
        oauth.fail(VendorApiError::unauthorized(400_u16, "invalid_grant"));
        let service = ConnectionService::new(
            Arc::new(InMemoryConnections::default()),
            Arc::new(oauth),
            Arc::new(StubMonitoringApi::new(now().date_naive())),
            Arc::new(MutableClock::new(now())),
        );

        let error = service
            .complete_authorization(UserId::random(), "stale")
            .await
            .expect_err("rejected");
        assert_eq!(error.code(), ErrorCode::BadGateway);
    }

    #[rstest]
    #[case(UserRole::Viewer, false)]
    #[case(UserRole::Admin, true)]
    #[case(UserRole::SuperAdmin, true)]
    fn only_writers_get_an_authorization_url(#[case] role: UserRole, #[case] allowed: bool) {
        let service = service(
            Arc::new(InMemoryConnections::default()),
            Arc::new(StubMonitoringApi::new(now().date_naive())),
        );
        let user = user_fixture(role);

        let result = service.authorization_url(&user);
        assert_eq!(result.is_ok(), allowed);
        if let Ok(url) = result {
            assert!(url.ends_with(&format!("state={}", user.id)));
        }
    }

    #[tokio::test]
    async fn viewers_read_their_admins_connections() {
        let admin = user_fixture(UserRole::Admin);
        let viewer = AuthenticatedUser {
            created_by: Some(admin.id),
            ..user_fixture(UserRole::Viewer)
        };
        let connections = Arc::new(InMemoryConnections::default());
        let mut connection =
            connection_fixture(admin.id, SystemId::new("31").expect("system"), now());
        connection.last_sync_at = Some(now());
        connections.insert(connection.clone());
        let service = service(
            connections,
            Arc::new(StubMonitoringApi::new(now().date_naive())),
        );

        let listed = service.list(&viewer).await.expect("list");
        assert_eq!(listed, vec![connection.clone()]);
        assert_eq!(service.check_updates(&viewer).await.expect("updates"), Some(now()));
        let readable = service.readable(&viewer, None).await.expect("readable");
        assert_eq!(readable.id, connection.id);
        let error = service
            .disconnect(&viewer, &connection.id)
            .await
            .expect_err("viewer cannot delete");
        assert_eq!(error.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn admins_cannot_delete_other_admins_connections() {
        let owner = user_fixture(UserRole::Admin);
        let intruder = user_fixture(UserRole::Admin);
        let connection = connection_fixture(owner.id, SystemId::new("5").expect("system"), now());
        let mut repository = MockConnectionRepository::new();
        let found = connection.clone();
        repository
            .expect_find_by_id()
            .returning(move |_| Ok(Some(found.clone())));
        repository.expect_delete().never();
        let service = service(
            Arc::new(repository),
            Arc::new(StubMonitoringApi::new(now().date_naive())),
        );

        let error = service
            .disconnect(&intruder, &connection.id)
            .await
            .expect_err("forbidden");
        assert_eq!(error.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn super_admins_read_any_system() {
        let owner = user_fixture(UserRole::Admin);
        let system = SystemId::new("77").expect("system");
        let connections = Arc::new(InMemoryConnections::default());
        connections.insert(connection_fixture(owner.id, system.clone(), now()));
        let service = service(
            connections,
            Arc::new(StubMonitoringApi::new(now().date_naive())),
        );

        let root = user_fixture(UserRole::SuperAdmin);
        let other_admin = user_fixture(UserRole::Admin);
        assert!(service.readable(&root, Some(&system)).await.is_ok());
        let error = service
            .readable(&other_admin, Some(&system))
            .await
            .expect_err("not theirs");
        assert_eq!(error.code(), ErrorCode::NotFound);
    }
}
