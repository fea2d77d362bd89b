//! PostgreSQL persistence adapters using Diesel.
//!
//! Repositories implement the domain's storage ports over a shared
//! [`DbPool`] (`diesel-async` + `bb8`). Row structs and table definitions
//! stay private to this module; only domain types cross the port boundary.
//!
//! # Example
//!
//! ```ignore
//! use solarboard::outbound::persistence::{DbPool, DieselConnectionRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/solarboard")).await?;
//! let connections = DieselConnectionRepository::new(pool);
//! ```

mod diesel_api_call_log_repository;
mod diesel_connection_repository;
mod diesel_credential_resolver;
pub(crate) mod diesel_helpers;
mod diesel_production_record_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_api_call_log_repository::DieselApiCallLogRepository;
pub use diesel_connection_repository::DieselConnectionRepository;
pub use diesel_credential_resolver::{DieselCredentialResolver, bearer_digest};
pub use diesel_production_record_repository::DieselProductionRecordRepository;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{
    DEFAULT_CHECKOUT_TIMEOUT_SECONDS, DEFAULT_POOL_MAX_SIZE, DbPool, PoolConfig, PoolError,
};
