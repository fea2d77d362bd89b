//! Connection lifecycle handlers.
//!
//! ```text
//! GET    /api/v1/connections
//! GET    /api/v1/connections/check-updates
//! DELETE /api/v1/connections/{id}
//! POST   /api/v1/connections/{id}/sync?full=true
//! GET    /api/v1/connections/enphase/authorize
//! GET    /api/v1/connections/enphase/callback?code=..&state=..
//! ```

use actix_web::http::header;
use actix_web::{HttpResponse, delete, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{
    Connection, ConnectionId, Error, SyncReport, SyncTarget, TraceId, UserId,
};

use super::ApiResult;
use super::auth::BearerUser;
use super::cache_control::private_no_cache_header;
use super::state::HttpState;

/// A vendor connection as shown on the dashboard. Tokens never leave the
/// server.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub id: Uuid,
    #[schema(example = "4136754")]
    pub system_id: String,
    pub system_name: Option<String>,
    pub system_size_w: Option<i64>,
    pub timezone: Option<String>,
    pub is_active: bool,
    pub consumption_unavailable: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Connection> for ConnectionResponse {
    fn from(connection: Connection) -> Self {
        Self {
            id: *connection.id.as_uuid(),
            system_id: connection.system_id.as_str().to_owned(),
            system_name: connection.display.name,
            system_size_w: connection.display.size_w,
            timezone: connection.display.timezone,
            is_active: connection.is_active,
            consumption_unavailable: connection.consumption_unavailable,
            last_sync_at: connection.last_sync_at,
            token_expires_at: connection.token_expires_at,
            created_at: connection.created_at,
        }
    }
}

/// Latest sync across the caller's connections.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesResponse {
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Rows removed with a connection.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub deleted_production_records: u64,
    pub deleted_api_call_logs: u64,
}

/// An optional step that failed during a sync.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepFailureResponse {
    #[schema(example = "battery_telemetry")]
    pub step: String,
    pub message: String,
}

/// Outcome of a sync run.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncReportResponse {
    /// Successful vendor calls made by the run.
    pub api_calls: u32,
    /// Another sync of the same connection was already running.
    pub skipped: bool,
    pub failures: Vec<StepFailureResponse>,
}

impl From<SyncReport> for SyncReportResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            api_calls: report.api_calls,
            skipped: report.skipped,
            failures: report
                .failures
                .into_iter()
                .map(|failure| StepFailureResponse {
                    step: failure.step.to_owned(),
                    message: failure.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SyncQuery {
    /// Run the 30-day backfill instead of the incremental sync.
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    /// The initiating user's id, echoed back by the vendor.
    pub state: Option<String>,
    /// Set by the vendor when consent was refused.
    pub error: Option<String>,
}

fn parse_connection_id(raw: &str) -> ApiResult<ConnectionId> {
    raw.parse()
}

/// List the connections the caller can read.
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    responses(
        (status = 200, description = "Connections", body = [ConnectionResponse]),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["connections"],
    operation_id = "listConnections"
)]
#[get("/connections")]
pub async fn list_connections(
    state: web::Data<HttpState>,
    user: BearerUser,
) -> ApiResult<HttpResponse> {
    let connections = state.connections.list(&user).await?;
    let body: Vec<ConnectionResponse> = connections.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok()
        .insert_header(private_no_cache_header())
        .json(body))
}

/// Report the latest sync time so dashboards can poll cheaply.
#[utoipa::path(
    get,
    path = "/api/v1/connections/check-updates",
    responses(
        (status = 200, description = "Latest sync", body = UpdatesResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["connections"],
    operation_id = "checkUpdates"
)]
#[get("/connections/check-updates")]
pub async fn check_updates(
    state: web::Data<HttpState>,
    user: BearerUser,
) -> ApiResult<HttpResponse> {
    let last_sync_at = state.connections.check_updates(&user).await?;
    Ok(HttpResponse::Ok()
        .insert_header(private_no_cache_header())
        .json(UpdatesResponse { last_sync_at }))
}

/// Delete a connection with its cached rows and call log.
#[utoipa::path(
    delete,
    path = "/api/v1/connections/{id}",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Deleted", body = DisconnectResponse),
        (status = 400, description = "Invalid id", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown connection", body = Error)
    ),
    tags = ["connections"],
    operation_id = "deleteConnection"
)]
#[delete("/connections/{id}")]
pub async fn delete_connection(
    state: web::Data<HttpState>,
    user: BearerUser,
    path: web::Path<String>,
) -> ApiResult<web::Json<DisconnectResponse>> {
    let id = parse_connection_id(&path.into_inner())?;
    let deleted = state.connections.disconnect(&user, &id).await?;
    Ok(web::Json(DisconnectResponse {
        deleted_production_records: deleted.production_records,
        deleted_api_call_logs: deleted.api_call_logs,
    }))
}

/// Sync one connection now.
#[utoipa::path(
    post,
    path = "/api/v1/connections/{id}/sync",
    params(("id" = Uuid, Path, description = "Connection id"), SyncQuery),
    responses(
        (status = 200, description = "Sync finished", body = SyncReportResponse),
        (status = 403, description = "Viewer or not the owner", body = Error),
        (status = 404, description = "Unknown connection", body = Error),
        (status = 502, description = "Vendor rejected the call", body = Error),
        (status = 503, description = "Vendor unavailable", body = Error)
    ),
    tags = ["connections"],
    operation_id = "syncConnection"
)]
#[post("/connections/{id}/sync")]
pub async fn sync_connection(
    state: web::Data<HttpState>,
    user: BearerUser,
    path: web::Path<String>,
    query: web::Query<SyncQuery>,
) -> ApiResult<web::Json<SyncReportResponse>> {
    let id = parse_connection_id(&path.into_inner())?;
    let connection = state.connections.writable(&user, &id).await?;
    let target = state.vault.sync_target_for(&connection).await?;
    let report = if query.full {
        state.sync.sync_full_history(&target).await?
    } else {
        state.sync.sync_all_data(&target).await?
    };
    Ok(web::Json(report.into()))
}

/// Send the browser to the vendor consent page.
#[utoipa::path(
    get,
    path = "/api/v1/connections/enphase/authorize",
    responses(
        (status = 302, description = "Redirect to the vendor", headers(("Location" = String))),
        (status = 403, description = "Viewers cannot connect systems", body = Error)
    ),
    tags = ["connections"],
    operation_id = "authorizeEnphase"
)]
#[get("/connections/enphase/authorize")]
pub async fn authorize(state: web::Data<HttpState>, user: BearerUser) -> ApiResult<HttpResponse> {
    let location = state.connections.authorization_url(&user)?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish())
}

/// `dashboard_url` with one extra query pair.
fn dashboard_redirect(dashboard_url: &str, key: &str, value: &str) -> HttpResponse {
    let location = match Url::parse(dashboard_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(key, value);
            url.to_string()
        }
        Err(parse_error) => {
            warn!(%parse_error, "dashboard URL is not absolute; redirecting verbatim");
            dashboard_url.to_owned()
        }
    };
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Backfill a new connection in the background.
fn spawn_full_history(state: web::Data<HttpState>, connection: Connection) {
    TraceId::spawn_scoped(async move {
        let target: SyncTarget = match state.vault.sync_target_for(&connection).await {
            Ok(target) => target,
            Err(sync_error) => {
                error!(connection_id = %connection.id, %sync_error, "full-history sync could not start");
                return;
            }
        };
        match state.sync.sync_full_history(&target).await {
            Ok(report) => info!(
                connection_id = %connection.id,
                api_calls = report.api_calls,
                failures = report.failures.len(),
                "full-history sync finished"
            ),
            Err(sync_error) => {
                error!(connection_id = %connection.id, %sync_error, "full-history sync failed");
            }
        }
    });
}

/// Complete the OAuth flow, then return to the dashboard.
///
/// Always redirects; failures are reported through an `error` query
/// parameter.
#[utoipa::path(
    get,
    path = "/api/v1/connections/enphase/callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Redirect to the dashboard", headers(("Location" = String)))
    ),
    tags = ["connections"],
    operation_id = "enphaseCallback",
    security([])
)]
#[get("/connections/enphase/callback")]
pub async fn callback(
    state: web::Data<HttpState>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    let CallbackQuery {
        code,
        state: owner,
        error: vendor_error,
    } = query.into_inner();
    if let Some(reason) = vendor_error {
        warn!(%reason, "vendor consent refused");
        return dashboard_redirect(&state.dashboard_url, "error", "access_denied");
    }
    let (Some(code), Some(owner)) = (code, owner) else {
        return dashboard_redirect(&state.dashboard_url, "error", "missing_parameters");
    };
    let owner: UserId = match owner.parse() {
        Ok(owner) => owner,
        Err(_) => return dashboard_redirect(&state.dashboard_url, "error", "invalid_state"),
    };

    match state.connections.complete_authorization(owner, &code).await {
        Ok(connection) => {
            spawn_full_history(state.clone(), connection);
            dashboard_redirect(&state.dashboard_url, "connected", "true")
        }
        Err(failure) => {
            warn!(user_id = %owner, code = ?failure.code(), message = failure.message(), "authorisation failed");
            dashboard_redirect(&state.dashboard_url, "error", "authorization_failed")
        }
    }
}
