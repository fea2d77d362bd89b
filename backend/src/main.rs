//! Backend entry-point: loads settings, applies migrations, and serves the
//! REST API.

mod server;

use actix_web::web;
use color_eyre::eyre::{Context, Result, eyre};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use solarboard::inbound::http::health::HealthState;
use solarboard::outbound::persistence::{DbPool, run_migrations};
use solarboard::settings::Settings;

use server::{ServerConfig, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(%error, "tracing init failed");
    }

    let settings = Settings::load_from_iter(std::env::args_os())
        .map_err(|error| eyre!("failed to load settings: {error}"))?;
    let pool_config = settings.pool_config()?;
    info!(database = %pool_config.redacted_url(), "connecting to database");
    run_migrations(pool_config.database_url().to_owned())
        .await
        .wrap_err("database migrations failed")?;
    let pool = DbPool::new(pool_config)
        .await
        .wrap_err("database pool construction failed")?;

    let bind_addr = settings.bind_addr()?;
    let config = ServerConfig::new(
        bind_addr,
        pool,
        settings.vendor_config()?,
        settings.http_options()?,
    );
    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), config)?;
    info!(%bind_addr, "listening");

    let outcome = server.await;
    health_state.mark_unhealthy();
    outcome.wrap_err("HTTP server failed")
}
