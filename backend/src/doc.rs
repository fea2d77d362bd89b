//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every HTTP endpoint of the inbound layer, the
//! response schemas, and the bearer security scheme. Swagger UI serves it in
//! debug builds.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{Error, ErrorCode, UserRole};
use crate::inbound::http::connections::{
    ConnectionResponse, DisconnectResponse, StepFailureResponse, SyncReportResponse,
    UpdatesResponse,
};
use crate::inbound::http::data::{
    DailyEnergyResponse, DateRangeResponse, HistoryDayResponse, HistoryResponse, QuotaResponse,
    RefreshResponse, StatsResponse, UsageResponse,
};

/// Adds the opaque bearer credential scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);
        let mut scheme = Http::new(HttpAuthScheme::Bearer);
        scheme.description = Some("Opaque session token issued by the dashboard.".to_owned());
        components.add_security_scheme("BearerToken", SecurityScheme::Http(scheme));
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Solarboard API",
        description = "Cached solar telemetry, vendor connections and health probes."
    ),
    servers((url = "/", description = "Relative to the deployment base URL")),
    security(("BearerToken" = [])),
    paths(
        crate::inbound::http::connections::list_connections,
        crate::inbound::http::connections::check_updates,
        crate::inbound::http::connections::delete_connection,
        crate::inbound::http::connections::sync_connection,
        crate::inbound::http::connections::authorize,
        crate::inbound::http::connections::callback,
        crate::inbound::http::data::refresh,
        crate::inbound::http::data::history,
        crate::inbound::http::data::date_range,
        crate::inbound::http::data::stats,
        crate::inbound::http::data::quota,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        UserRole,
        ConnectionResponse,
        UpdatesResponse,
        DisconnectResponse,
        StepFailureResponse,
        SyncReportResponse,
        UsageResponse,
        RefreshResponse,
        HistoryDayResponse,
        HistoryResponse,
        DailyEnergyResponse,
        DateRangeResponse,
        StatsResponse,
        QuotaResponse,
    )),
    tags(
        (name = "connections", description = "Vendor connection lifecycle"),
        (name = "data", description = "Cached telemetry and vendor call quota"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
