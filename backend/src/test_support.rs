//! Test utilities for the solarboard crate.
//!
//! Shared by unit tests in `src/` and integration tests in `tests/`. Compiled
//! for tests and behind the `test-support` feature.

mod clock;
mod fixtures;
mod memory;
mod vendor;

pub use clock::MutableClock;
pub use fixtures::{connection_fixture, snapshot_fixture, user_fixture};
pub use memory::{
    InMemoryApiCallLog, InMemoryConnections, InMemoryCredentials, InMemoryProductionRecords,
};
pub use vendor::{StubMonitoringApi, StubOAuthClient, daily_value};

pub mod openapi {
    //! Helpers for inspecting generated OpenAPI documents in tests.

    use utoipa::openapi::schema::{Object, Schema};
    use utoipa::openapi::{OpenApi, RefOr};

    /// The named component schema, which must be a plain object.
    pub fn object_schema<'a>(doc: &'a OpenApi, name: &str) -> &'a Object {
        let schema = doc
            .components
            .as_ref()
            .and_then(|components| components.schemas.get(name))
            .unwrap_or_else(|| panic!("schema {name} missing from components"));
        match schema {
            RefOr::T(Schema::Object(object)) => object,
            _ => panic!("schema {name} is not an object"),
        }
    }

    /// Whether `path` is documented.
    pub fn has_path(doc: &OpenApi, path: &str) -> bool {
        doc.paths.paths.contains_key(path)
    }
}
