//! Domain ports defining the edges of the hexagon.
//!
//! Ports describe how the sync core talks to the vendor API, the relational
//! store, and the credential and allowance stores. Each trait exposes
//! strongly typed errors so adapters map their failures into predictable
//! variants.

mod macros;

pub(crate) use macros::define_port_error;

mod api_call_log_repository;
mod connection_repository;
mod credential_resolver;
mod monitoring_api;
mod oauth_client;
mod production_record_repository;
mod refresh_allowance_store;
mod vendor_api_error;

#[cfg(test)]
pub use api_call_log_repository::MockApiCallLogRepository;
pub use api_call_log_repository::{ApiCallLogRepository, ApiCallLogRepositoryError};
#[cfg(test)]
pub use connection_repository::MockConnectionRepository;
pub use connection_repository::{ConnectionRepository, ConnectionRepositoryError};
#[cfg(test)]
pub use credential_resolver::MockCredentialResolver;
pub use credential_resolver::{CredentialResolver, CredentialResolverError};
#[cfg(test)]
pub use monitoring_api::MockMonitoringApi;
pub use monitoring_api::{
    BatteryDeviceReading, BatteryInterval, DailySeries, DailySeriesKind, LatestTelemetry,
    MeterInterval, MeterKind, MonitoringApi, SystemSummary, SystemsPage, TimeWindow,
    VendorEndpoint, VendorSystem,
};
#[cfg(test)]
pub use oauth_client::MockOAuthClient;
pub use oauth_client::OAuthClient;
#[cfg(test)]
pub use production_record_repository::MockProductionRecordRepository;
pub use production_record_repository::{
    ProductionRecordRepository, ProductionRecordRepositoryError,
};
#[cfg(test)]
pub use refresh_allowance_store::MockRefreshAllowanceStore;
pub use refresh_allowance_store::{RefreshAllowanceStore, RefreshAllowanceStoreError};
pub use vendor_api_error::{FEATURE_UNAVAILABLE_STATUS, VendorApiError};
