//! Builds the HTTP state from PostgreSQL and vendor adapters.

use std::sync::Arc;

use mockable::{Clock, DefaultClock};

use solarboard::inbound::http::state::{HttpState, HttpStateOptions, HttpStatePorts};
use solarboard::outbound::enphase::{EnphaseClientConfig, EnphaseHttpClient};
use solarboard::outbound::memory::InMemoryRefreshAllowanceStore;
use solarboard::outbound::persistence::{
    DieselApiCallLogRepository, DieselConnectionRepository, DieselCredentialResolver,
    DbPool, DieselProductionRecordRepository,
};

/// Wire the Diesel repositories and the vendor client into [`HttpState`].
///
/// # Errors
/// Returns [`std::io::Error`] when the vendor HTTP client cannot be built.
pub(crate) fn build_http_state(
    db_pool: DbPool,
    vendor: EnphaseClientConfig,
    options: HttpStateOptions,
) -> std::io::Result<HttpState> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let vendor = Arc::new(EnphaseHttpClient::new(vendor).map_err(|error| {
        std::io::Error::other(format!("vendor client construction failed: {error}"))
    })?);

    let ports = HttpStatePorts {
        credentials: Arc::new(DieselCredentialResolver::new(db_pool.clone(), clock.clone())),
        connections: Arc::new(DieselConnectionRepository::new(db_pool.clone())),
        records: Arc::new(DieselProductionRecordRepository::new(db_pool.clone())),
        call_log: Arc::new(DieselApiCallLogRepository::new(db_pool)),
        refresh_allowances: Arc::new(InMemoryRefreshAllowanceStore::default()),
        oauth: vendor.clone(),
        api: vendor,
        clock,
    };
    Ok(HttpState::new(ports, options))
}
