//! HTTP inbound adapter exposing REST endpoints.

pub mod auth;
pub mod cache_control;
pub mod connections;
pub mod data;
pub mod error;
pub mod health;
pub mod state;
#[cfg(test)]
pub mod test_utils;

pub use error::ApiResult;

use actix_web::web;

/// Register the authenticated API routes on `cfg`.
///
/// Mounted under `/api/v1` by the server.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(connections::list_connections)
        .service(connections::check_updates)
        .service(connections::authorize)
        .service(connections::callback)
        .service(connections::delete_connection)
        .service(connections::sync_connection)
        .service(data::refresh)
        .service(data::history)
        .service(data::date_range)
        .service(data::stats)
        .service(data::quota);
}
