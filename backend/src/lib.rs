//! Solar telemetry sync and caching backend.
//!
//! The [`domain`] owns the sync and cache rules, [`outbound`] adapts them to
//! PostgreSQL and the vendor API, and [`inbound`] exposes them over HTTP.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
