//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_web::web;
use chrono::{DateTime, TimeZone, Utc};

use crate::domain::{AuthenticatedUser, Connection, SystemId, UserRole};
use crate::outbound::memory::InMemoryRefreshAllowanceStore;
use crate::test_support::{
    InMemoryApiCallLog, InMemoryConnections, InMemoryCredentials, InMemoryProductionRecords,
    MutableClock, StubMonitoringApi, StubOAuthClient, connection_fixture, user_fixture,
};

use super::state::{HttpState, HttpStateOptions, HttpStatePorts};

pub const DASHBOARD_URL: &str = "https://dash.test/dashboard";

/// Fixed "now" shared by handler tests.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 18, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("valid instant"))
}

/// In-memory doubles wired into an [`HttpState`].
pub struct TestHarness {
    pub credentials: Arc<InMemoryCredentials>,
    pub connections: Arc<InMemoryConnections>,
    pub records: Arc<InMemoryProductionRecords>,
    pub call_log: Arc<InMemoryApiCallLog>,
    pub api: Arc<StubMonitoringApi>,
    pub oauth: Arc<StubOAuthClient>,
    pub clock: Arc<MutableClock>,
    state: web::Data<HttpState>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_api(StubMonitoringApi::new(test_now().date_naive()))
    }

    pub fn with_api(api: StubMonitoringApi) -> Self {
        let credentials = Arc::new(InMemoryCredentials::default());
        let connections = Arc::new(InMemoryConnections::default());
        let records = Arc::new(InMemoryProductionRecords::default());
        let call_log = Arc::new(InMemoryApiCallLog::default());
        let api = Arc::new(api);
        let oauth = Arc::new(StubOAuthClient::default());
        let clock = Arc::new(MutableClock::new(test_now()));
        let state = HttpState::new(
            HttpStatePorts {
                credentials: credentials.clone(),
                connections: connections.clone(),
                records: records.clone(),
                call_log: call_log.clone(),
                refresh_allowances: Arc::new(InMemoryRefreshAllowanceStore::default()),
                oauth: oauth.clone(),
                api: api.clone(),
                clock: clock.clone(),
            },
            HttpStateOptions {
                dashboard_url: DASHBOARD_URL.to_owned(),
                daily_refresh_limit: 2,
                ..HttpStateOptions::default()
            },
        );
        Self {
            credentials,
            connections,
            records,
            call_log,
            api,
            oauth,
            clock,
            state: web::Data::new(state),
        }
    }

    pub fn data(&self) -> web::Data<HttpState> {
        self.state.clone()
    }

    /// Register a user of `role` behind `bearer`.
    pub fn login(&self, bearer: &str, role: UserRole) -> AuthenticatedUser {
        let user = user_fixture(role);
        self.credentials.grant(bearer, user.clone());
        user
    }

    /// Store an active connection owned by `user`.
    pub fn connect(&self, user: &AuthenticatedUser, system: &str) -> Connection {
        let connection = connection_fixture(
            user.id,
            SystemId::new(system).unwrap_or_else(|error| panic!("system id: {error}")),
            test_now(),
        );
        self.connections.insert(connection.clone());
        connection
    }
}
