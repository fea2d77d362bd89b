//! HTTP server configuration object.

use std::net::SocketAddr;

use solarboard::inbound::http::state::HttpStateOptions;
use solarboard::outbound::enphase::EnphaseClientConfig;
use solarboard::outbound::persistence::DbPool;

/// Everything `create_server` needs beyond the health state.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) db_pool: DbPool,
    pub(crate) vendor: EnphaseClientConfig,
    pub(crate) options: HttpStateOptions,
}

impl ServerConfig {
    #[must_use]
    pub fn new(
        bind_addr: SocketAddr,
        db_pool: DbPool,
        vendor: EnphaseClientConfig,
        options: HttpStateOptions,
    ) -> Self {
        Self {
            bind_addr,
            db_pool,
            vendor,
            options,
        }
    }
}
