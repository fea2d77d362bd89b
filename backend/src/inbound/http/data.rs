//! Telemetry read and refresh handlers.
//!
//! ```text
//! POST /api/v1/data/refresh
//! GET  /api/v1/data/history?days=14
//! GET  /api/v1/data/date-range?startDate=2026-01-01&endDate=2026-01-31
//! GET  /api/v1/data/stats
//! GET  /api/v1/quota
//! ```
//!
//! Super admins may pass `systemId` to read any system; everyone else reads
//! the active connection of their data owner.

use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::domain::range_queries::{CallUsage, DailyEnergy, HistoryDay};
use crate::domain::{
    AuthenticatedUser, Connection, DateRangeReport, Error, HistoryReport, StatsReport, SystemId,
};

use super::ApiResult;
use super::auth::BearerUser;
use super::cache_control::private_no_cache_header;
use super::connections::SyncReportResponse;
use super::state::HttpState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct SystemQuery {
    /// Vendor system id; honoured for super admins only.
    pub system_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Trailing days ending today, 1 to 90. Defaults to 14.
    pub days: Option<u32>,
    pub system_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    #[param(value_type = String, format = Date)]
    pub start_date: NaiveDate,
    #[param(value_type = String, format = Date)]
    pub end_date: NaiveDate,
    /// Refetch even when every month is cached.
    #[serde(default)]
    pub refresh: bool,
    pub system_id: Option<String>,
}

async fn resolve_connection(
    state: &HttpState,
    user: &AuthenticatedUser,
    system_id: Option<&str>,
) -> ApiResult<Connection> {
    let system = system_id.map(SystemId::new).transpose()?;
    state.connections.readable(user, system.as_ref()).await
}

/// Vendor call accounting attached to query responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub api_calls_used: u32,
    pub from_cache: bool,
    pub api_calls_this_month: u64,
    pub api_limit: u64,
}

impl From<CallUsage> for UsageResponse {
    fn from(usage: CallUsage) -> Self {
        Self {
            api_calls_used: usage.api_calls_used,
            from_cache: usage.from_cache(),
            api_calls_this_month: usage.api_calls_this_month,
            api_limit: usage.api_limit,
        }
    }
}

/// Result of a manual refresh.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub sync: SyncReportResponse,
    /// Refreshes used today; zero for unlimited callers.
    pub refresh_count: u32,
    /// `None` for super admins.
    pub max_refreshes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDayResponse {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub energy_wh: i64,
    pub cost: f64,
    pub available: bool,
}

impl From<HistoryDay> for HistoryDayResponse {
    fn from(day: HistoryDay) -> Self {
        Self {
            date: day.date,
            energy_wh: day.energy_wh,
            cost: day.cost,
            available: day.available,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub days: Vec<HistoryDayResponse>,
    pub price_per_kwh: f64,
    pub total_wh: i64,
    pub total_cost: f64,
    #[serde(flatten)]
    pub usage: UsageResponse,
}

impl From<HistoryReport> for HistoryResponse {
    fn from(report: HistoryReport) -> Self {
        Self {
            days: report.days.into_iter().map(Into::into).collect(),
            price_per_kwh: report.price_per_kwh,
            total_wh: report.total_wh,
            total_cost: report.total_cost,
            usage: report.usage.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyEnergyResponse {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub production_wh: i64,
    pub consumption_wh: i64,
    pub self_consumption_wh: i64,
}

impl From<DailyEnergy> for DailyEnergyResponse {
    fn from(day: DailyEnergy) -> Self {
        Self {
            date: day.date,
            production_wh: day.production_wh,
            consumption_wh: day.consumption_wh,
            self_consumption_wh: day.self_consumption_wh,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeResponse {
    #[schema(value_type = String, format = Date)]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub end_date: NaiveDate,
    pub days: Vec<DailyEnergyResponse>,
    pub total_production_wh: i64,
    pub total_consumption_wh: i64,
    #[serde(flatten)]
    pub usage: UsageResponse,
}

impl From<DateRangeReport> for DateRangeResponse {
    fn from(report: DateRangeReport) -> Self {
        Self {
            start_date: report.range.start(),
            end_date: report.range.end(),
            days: report.days.into_iter().map(Into::into).collect(),
            total_production_wh: report.total_production_wh,
            total_consumption_wh: report.total_consumption_wh,
            usage: report.usage.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub power_now_w: i64,
    pub consumption_now_w: Option<i64>,
    pub battery_power_w: Option<i64>,
    pub today_production_wh: i64,
    pub month_production_wh: i64,
    pub lifetime_production_wh: i64,
    pub lifetime_consumption_wh: Option<i64>,
    pub status: Option<String>,
    pub system_size_w: Option<i64>,
    pub last_update: Option<DateTime<Utc>>,
    pub api_calls_this_month: u64,
    pub api_limit: u64,
}

impl From<StatsReport> for StatsResponse {
    fn from(report: StatsReport) -> Self {
        Self {
            power_now_w: report.power_now_w,
            consumption_now_w: report.consumption_now_w,
            battery_power_w: report.battery_power_w,
            today_production_wh: report.today_production_wh,
            month_production_wh: report.month_production_wh,
            lifetime_production_wh: report.lifetime_production_wh,
            lifetime_consumption_wh: report.lifetime_consumption_wh,
            status: report.status,
            system_size_w: report.system_size_w,
            last_update: report.last_update,
            api_calls_this_month: report.api_calls_this_month,
            api_limit: report.api_limit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
}

/// Run an incremental sync of the caller's connection.
///
/// Only a sync that ran to completion counts against the daily allowance.
#[utoipa::path(
    post,
    path = "/api/v1/data/refresh",
    params(SystemQuery),
    responses(
        (status = 200, description = "Sync finished", body = RefreshResponse),
        (status = 403, description = "Viewers cannot refresh", body = Error),
        (status = 404, description = "No active connection", body = Error),
        (status = 429, description = "Daily refresh limit reached", body = Error),
        (status = 502, description = "Vendor rejected the call", body = Error)
    ),
    tags = ["data"],
    operation_id = "refreshData"
)]
#[post("/data/refresh")]
pub async fn refresh(
    state: web::Data<HttpState>,
    user: BearerUser,
    query: web::Query<SystemQuery>,
) -> ApiResult<web::Json<RefreshResponse>> {
    let connection = resolve_connection(&state, &user, query.system_id.as_deref()).await?;
    let allowance = state.refresh.check(&user).await?;
    let target = state.vault.sync_target_for(&connection).await?;
    let report = state.sync.sync_all_data(&target).await?;
    let allowance = if report.skipped {
        allowance
    } else {
        state.refresh.commit(&user, allowance).await
    };
    info!(
        user_id = %user.id,
        connection_id = %connection.id,
        refresh_count = allowance.used,
        api_calls = report.api_calls,
        "manual refresh finished"
    );
    Ok(web::Json(RefreshResponse {
        sync: report.into(),
        refresh_count: allowance.used,
        max_refreshes: allowance.limit,
    }))
}

/// Daily production for the trailing window, valued at the configured
/// price.
#[utoipa::path(
    get,
    path = "/api/v1/data/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Daily history", body = HistoryResponse),
        (status = 400, description = "Invalid day count", body = Error),
        (status = 404, description = "No active connection", body = Error)
    ),
    tags = ["data"],
    operation_id = "getHistory"
)]
#[get("/data/history")]
pub async fn history(
    state: web::Data<HttpState>,
    user: BearerUser,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    let connection = resolve_connection(&state, &user, query.system_id.as_deref()).await?;
    let report = state.queries.history(&connection, query.days).await?;
    Ok(HttpResponse::Ok()
        .insert_header(private_no_cache_header())
        .json(HistoryResponse::from(report)))
}

/// Daily production and consumption between two dates, inclusive.
#[utoipa::path(
    get,
    path = "/api/v1/data/date-range",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Daily energy", body = DateRangeResponse),
        (status = 400, description = "Invalid range", body = Error),
        (status = 404, description = "No active connection", body = Error)
    ),
    tags = ["data"],
    operation_id = "getDateRange"
)]
#[get("/data/date-range")]
pub async fn date_range(
    state: web::Data<HttpState>,
    user: BearerUser,
    query: web::Query<DateRangeQuery>,
) -> ApiResult<HttpResponse> {
    let connection = resolve_connection(&state, &user, query.system_id.as_deref()).await?;
    let report = state
        .queries
        .date_range(&connection, query.start_date, query.end_date, query.refresh)
        .await?;
    Ok(HttpResponse::Ok()
        .insert_header(private_no_cache_header())
        .json(DateRangeResponse::from(report)))
}

/// Headline figures from stored snapshots.
#[utoipa::path(
    get,
    path = "/api/v1/data/stats",
    params(SystemQuery),
    responses(
        (status = 200, description = "Current figures", body = StatsResponse),
        (status = 404, description = "No active connection", body = Error)
    ),
    tags = ["data"],
    operation_id = "getStats"
)]
#[get("/data/stats")]
pub async fn stats(
    state: web::Data<HttpState>,
    user: BearerUser,
    query: web::Query<SystemQuery>,
) -> ApiResult<HttpResponse> {
    let connection = resolve_connection(&state, &user, query.system_id.as_deref()).await?;
    let report = state.queries.stats(&connection).await?;
    Ok(HttpResponse::Ok()
        .insert_header(private_no_cache_header())
        .json(StatsResponse::from(report)))
}

/// Vendor calls used this month.
#[utoipa::path(
    get,
    path = "/api/v1/quota",
    params(SystemQuery),
    responses(
        (status = 200, description = "Monthly usage", body = QuotaResponse),
        (status = 404, description = "No active connection", body = Error)
    ),
    tags = ["data"],
    operation_id = "getQuota"
)]
#[get("/quota")]
pub async fn quota(
    state: web::Data<HttpState>,
    user: BearerUser,
    query: web::Query<SystemQuery>,
) -> ApiResult<web::Json<QuotaResponse>> {
    let connection = resolve_connection(&state, &user, query.system_id.as_deref()).await?;
    let usage = state.ledger.usage(&connection.id).await.map_err(Error::from)?;
    Ok(web::Json(QuotaResponse {
        used: usage.used,
        limit: usage.limit,
        remaining: usage.remaining(),
    }))
}

#[cfg(test)]
mod tests {
    //! Handler coverage over in-memory doubles.
    use super::*;
    use crate::domain::ports::{
        ApiCallLogRepository, DailySeriesKind, VendorApiError, VendorEndpoint,
    };
    use crate::domain::{ApiCallLogEntry, UserRole};
    use crate::inbound::http::test_utils::{TestHarness, test_now};
    use crate::test_support::snapshot_fixture;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test as actix_test};
    use rstest::rstest;
    use serde_json::Value;

    macro_rules! app {
        ($harness:expr) => {
            actix_test::init_service(
                App::new()
                    .app_data($harness.data())
                    .service(refresh)
                    .service(history)
                    .service(date_range)
                    .service(stats)
                    .service(quota),
            )
            .await
        };
    }

    fn get(uri: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::get()
            .uri(uri)
            .insert_header((header::AUTHORIZATION, "Bearer t"))
    }

    fn post(uri: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::post()
            .uri(uri)
            .insert_header((header::AUTHORIZATION, "Bearer t"))
    }

    #[actix_web::test]
    async fn refresh_counts_against_the_daily_limit() {
        let harness = TestHarness::new();
        let admin = harness.login("t", UserRole::Admin);
        harness.connect(&admin, "42");
        let app = app!(harness);

        for expected in 1..=2 {
            let body: Value =
                actix_test::call_and_read_body_json(&app, post("/data/refresh").to_request())
                    .await;
            assert_eq!(body["refreshCount"], expected);
            assert_eq!(body["maxRefreshes"], 2);
            assert_eq!(body["skipped"], false);
        }
        let response = actix_test::call_service(&app, post("/data/refresh").to_request()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn failed_refreshes_leave_the_allowance_untouched() {
        let harness = TestHarness::new();
        let admin = harness.login("t", UserRole::Admin);
        harness.connect(&admin, "42");
        harness
            .api
            .fail(VendorEndpoint::Summary, VendorApiError::timeout(30_u64));
        let app = app!(harness);

        for _ in 0..3 {
            let response =
                actix_test::call_service(&app, post("/data/refresh").to_request()).await;
            assert!(
                response.status().is_server_error(),
                "unexpected status {}",
                response.status()
            );
        }

        harness.api.recover(VendorEndpoint::Summary);
        let body: Value =
            actix_test::call_and_read_body_json(&app, post("/data/refresh").to_request()).await;
        assert_eq!(body["refreshCount"], 1);
        assert_eq!(body["skipped"], false);
    }

    #[rstest]
    #[case::viewer(UserRole::Viewer, StatusCode::FORBIDDEN)]
    #[case::super_admin(UserRole::SuperAdmin, StatusCode::OK)]
    #[actix_web::test]
    async fn refresh_is_role_gated(#[case] role: UserRole, #[case] expected: StatusCode) {
        let harness = TestHarness::new();
        let caller = harness.login("t", role);
        harness.connect(&caller, "42");
        let app = app!(harness);

        let response = actix_test::call_service(&app, post("/data/refresh").to_request()).await;
        assert_eq!(response.status(), expected);
    }

    #[actix_web::test]
    async fn history_served_twice_hits_the_vendor_once() {
        let harness = TestHarness::new();
        let admin = harness.login("t", UserRole::Admin);
        harness.connect(&admin, "42");
        let app = app!(harness);

        let first: Value =
            actix_test::call_and_read_body_json(&app, get("/data/history?days=7").to_request())
                .await;
        assert_eq!(first["days"].as_array().map(Vec::len), Some(7));
        assert_eq!(first["fromCache"], false);

        let second: Value =
            actix_test::call_and_read_body_json(&app, get("/data/history?days=7").to_request())
                .await;
        assert_eq!(second["fromCache"], true);
        assert_eq!(second["apiCallsUsed"], 0);
        assert_eq!(second["totalWh"], first["totalWh"]);
        assert_eq!(harness.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 1);
    }

    #[rstest]
    #[case::reversed("/data/date-range?startDate=2026-03-10&endDate=2026-03-01")]
    #[case::unparsable("/data/date-range?startDate=yesterday&endDate=2026-03-01")]
    #[case::too_many_days("/data/history?days=91")]
    #[actix_web::test]
    async fn invalid_queries_are_bad_requests(#[case] uri: &str) {
        let harness = TestHarness::new();
        let admin = harness.login("t", UserRole::Admin);
        harness.connect(&admin, "42");
        let app = app!(harness);

        let response = actix_test::call_service(&app, get(uri).to_request()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.api.calls().is_empty());
    }

    #[actix_web::test]
    async fn date_range_aggregates_per_day() {
        let harness = TestHarness::new();
        let admin = harness.login("t", UserRole::Admin);
        harness.connect(&admin, "42");
        let app = app!(harness);

        let body: Value = actix_test::call_and_read_body_json(
            &app,
            get("/data/date-range?startDate=2026-03-01&endDate=2026-03-03").to_request(),
        )
        .await;
        assert_eq!(body["startDate"], "2026-03-01");
        assert_eq!(body["days"].as_array().map(Vec::len), Some(3));
        let day = &body["days"][0];
        assert_eq!(
            day["selfConsumptionWh"],
            day["productionWh"].as_i64().min(day["consumptionWh"].as_i64()).expect("numbers")
        );
    }

    #[actix_web::test]
    async fn stats_and_quota_read_storage_only() {
        let harness = TestHarness::new();
        let admin = harness.login("t", UserRole::Admin);
        let connection = harness.connect(&admin, "42");
        harness
            .records
            .seed(&[snapshot_fixture(connection.id, test_now())]);
        let app = app!(harness);

        let stats_body: Value =
            actix_test::call_and_read_body_json(&app, get("/data/stats").to_request()).await;
        assert_eq!(stats_body["lastUpdate"], serde_json::to_value(test_now()).expect("json"));
        assert_eq!(stats_body["apiLimit"], 1_000);

        let quota_body: Value =
            actix_test::call_and_read_body_json(&app, get("/quota").to_request()).await;
        assert_eq!(quota_body["used"], 0);
        assert_eq!(quota_body["remaining"], 1_000);
        assert!(harness.api.calls().is_empty());
    }

    #[actix_web::test]
    async fn viewers_read_their_admins_system() {
        let harness = TestHarness::new();
        let admin = harness.login("admin", UserRole::Admin);
        let connection = harness.connect(&admin, "42");
        let viewer = harness.login("t", UserRole::Viewer);
        harness.credentials.grant(
            "t",
            AuthenticatedUser {
                created_by: Some(admin.id),
                ..viewer
            },
        );
        harness
            .call_log
            .append(&ApiCallLogEntry::succeeded(
                connection.id,
                "summary".to_owned(),
                std::time::Duration::from_millis(120),
                test_now(),
            ))
            .await
            .expect("append");
        let app = app!(harness);

        let quota_body: Value =
            actix_test::call_and_read_body_json(&app, get("/quota").to_request()).await;
        assert_eq!(quota_body["used"], 1);
    }

    #[actix_web::test]
    async fn missing_connection_is_not_found() {
        let harness = TestHarness::new();
        harness.login("t", UserRole::Admin);
        let app = app!(harness);

        let response = actix_test::call_service(&app, get("/data/stats").to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
