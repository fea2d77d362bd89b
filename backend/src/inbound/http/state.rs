//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain services and remain testable without I/O.

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use mockable::Clock;

use crate::domain::ports::{
    ApiCallLogRepository, ConnectionRepository, CredentialResolver, MonitoringApi, OAuthClient,
    ProductionRecordRepository, RefreshAllowanceStore,
};
use crate::domain::quota_ledger::DEFAULT_MONTHLY_LIMIT;
use crate::domain::range_queries::DEFAULT_PRICE_PER_KWH;
use crate::domain::refresh_policy::DEFAULT_DAILY_REFRESH_LIMIT;
use crate::domain::{
    ConnectionService, QuotaLedger, RangeFetcher, RangeQueryPorts, RangeQueryService,
    RecordWriter, RefreshPolicy, SyncService, TokenVault,
};

/// Parameter object bundling all port implementations for HTTP handlers.
#[derive(Clone)]
pub struct HttpStatePorts {
    pub credentials: Arc<dyn CredentialResolver>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub records: Arc<dyn ProductionRecordRepository>,
    pub call_log: Arc<dyn ApiCallLogRepository>,
    pub refresh_allowances: Arc<dyn RefreshAllowanceStore>,
    pub oauth: Arc<dyn OAuthClient>,
    pub api: Arc<dyn MonitoringApi>,
    pub clock: Arc<dyn Clock>,
}

/// Tunables read from settings.
#[derive(Debug, Clone)]
pub struct HttpStateOptions {
    /// Where the OAuth callback sends the browser afterwards.
    pub dashboard_url: String,
    pub monthly_limit: u64,
    /// Offset whose calendar month bounds the quota.
    pub quota_offset: FixedOffset,
    pub daily_refresh_limit: u32,
    pub price_per_kwh: f64,
}

impl Default for HttpStateOptions {
    fn default() -> Self {
        Self {
            dashboard_url: "http://localhost:3000/dashboard".to_owned(),
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            quota_offset: Utc.fix(),
            daily_refresh_limit: DEFAULT_DAILY_REFRESH_LIMIT,
            price_per_kwh: DEFAULT_PRICE_PER_KWH,
        }
    }
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub credentials: Arc<dyn CredentialResolver>,
    pub connections: ConnectionService,
    pub vault: TokenVault,
    pub sync: SyncService,
    pub queries: RangeQueryService,
    pub refresh: RefreshPolicy,
    pub ledger: QuotaLedger,
    pub dashboard_url: String,
}

impl HttpState {
    /// Wire the domain services over `ports`.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    ///
    /// use mockable::DefaultClock;
    /// use solarboard::inbound::http::state::{HttpState, HttpStateOptions, HttpStatePorts};
    /// use solarboard::outbound::memory::InMemoryRefreshAllowanceStore;
    /// use solarboard::test_support::{
    ///     InMemoryApiCallLog, InMemoryConnections, InMemoryCredentials,
    ///     InMemoryProductionRecords, StubMonitoringApi, StubOAuthClient,
    /// };
    ///
    /// let ports = HttpStatePorts {
    ///     credentials: Arc::new(InMemoryCredentials::default()),
    ///     connections: Arc::new(InMemoryConnections::default()),
    ///     records: Arc::new(InMemoryProductionRecords::default()),
    ///     call_log: Arc::new(InMemoryApiCallLog::default()),
    ///     refresh_allowances: Arc::new(InMemoryRefreshAllowanceStore::default()),
    ///     oauth: Arc::new(StubOAuthClient::default()),
    ///     api: Arc::new(StubMonitoringApi::new(chrono::Utc::now().date_naive())),
    ///     clock: Arc::new(DefaultClock),
    /// };
    /// let state = HttpState::new(ports, HttpStateOptions::default());
    /// assert!(state.dashboard_url.ends_with("/dashboard"));
    /// ```
    pub fn new(ports: HttpStatePorts, options: HttpStateOptions) -> Self {
        let HttpStatePorts {
            credentials,
            connections,
            records,
            call_log,
            refresh_allowances,
            oauth,
            api,
            clock,
        } = ports;

        let ledger = QuotaLedger::new(call_log, clock.clone())
            .with_reference_offset(options.quota_offset)
            .with_monthly_limit(options.monthly_limit);
        let vault = TokenVault::new(connections.clone(), oauth.clone(), clock.clone());
        let fetcher = RangeFetcher::new(api.clone(), ledger.clone());
        let sync = SyncService::new(
            connections.clone(),
            fetcher.clone(),
            RecordWriter::new(records.clone()),
            clock.clone(),
        );
        let queries = RangeQueryService::new(RangeQueryPorts {
            vault: vault.clone(),
            fetcher,
            records,
            connections: connections.clone(),
            ledger: ledger.clone(),
            clock: clock.clone(),
        })
        .with_price_per_kwh(options.price_per_kwh);

        Self {
            credentials,
            connections: ConnectionService::new(connections, oauth, api, clock.clone()),
            vault,
            sync,
            queries,
            refresh: RefreshPolicy::new(refresh_allowances, clock)
                .with_daily_limit(options.daily_refresh_limit),
            ledger,
            dashboard_url: options.dashboard_url,
        }
    }
}
