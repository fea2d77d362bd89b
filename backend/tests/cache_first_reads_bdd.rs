//! Behaviour tests for cache-first history and date-range reads.
//!
//! Scenarios run the query service over in-memory repositories and a
//! scripted vendor, counting how often daily production is requested.

use std::cell::RefCell;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio::runtime::Runtime;

use solarboard::domain::ports::{DailySeriesKind, VendorEndpoint};
use solarboard::domain::{
    CallUsage, Connection, QuotaLedger, RangeFetcher, RangeQueryPorts, RangeQueryService,
    SystemId, TokenVault, UserId,
};
use solarboard::test_support::{
    InMemoryApiCallLog, InMemoryConnections, InMemoryProductionRecords, MutableClock,
    StubMonitoringApi, StubOAuthClient, connection_fixture,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 18, 12, 0, 0)
        .single()
        .expect("valid instant")
}

struct Backend {
    connection: Connection,
    api: Arc<StubMonitoringApi>,
    queries: RangeQueryService,
}

struct CacheWorld {
    runtime: Runtime,
    backend: RefCell<Option<Backend>>,
    available_days: RefCell<Option<usize>>,
    last_usage: RefCell<Option<CallUsage>>,
}

impl CacheWorld {
    fn new() -> Self {
        Self {
            runtime: tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime"),
            backend: RefCell::new(None),
            available_days: RefCell::new(None),
            last_usage: RefCell::new(None),
        }
    }

    fn connect(&self) {
        let connection =
            connection_fixture(UserId::random(), SystemId::new("3300").expect("system"), now());
        let connections = Arc::new(InMemoryConnections::default());
        connections.insert(connection.clone());
        let records = Arc::new(InMemoryProductionRecords::default());
        let log = Arc::new(InMemoryApiCallLog::default());
        let api = Arc::new(StubMonitoringApi::new(now().date_naive()));
        let clock = Arc::new(MutableClock::new(now()));
        let ledger = QuotaLedger::new(log, clock.clone());
        let queries = RangeQueryService::new(RangeQueryPorts {
            vault: TokenVault::new(
                connections.clone(),
                Arc::new(StubOAuthClient::default()),
                clock.clone(),
            ),
            fetcher: RangeFetcher::new(api.clone(), ledger.clone()),
            records,
            connections,
            ledger,
            clock,
        });
        *self.backend.borrow_mut() = Some(Backend {
            connection,
            api,
            queries,
        });
    }

    fn with_backend<T>(&self, f: impl FnOnce(&Backend) -> T) -> T {
        let backend = self.backend.borrow();
        f(backend.as_ref().expect("system should be connected"))
    }

    fn request_history(&self, days: u32) {
        let report = self.with_backend(|backend| {
            self.runtime
                .block_on(backend.queries.history(&backend.connection, Some(days)))
                .expect("history should load")
        });
        *self.available_days.borrow_mut() =
            Some(report.days.iter().filter(|day| day.available).count());
        *self.last_usage.borrow_mut() = Some(report.usage);
    }

    fn request_range(&self, start: &str, end: &str, force_refresh: bool) {
        let start: NaiveDate = start.parse().expect("start date");
        let end: NaiveDate = end.parse().expect("end date");
        let report = self.with_backend(|backend| {
            self.runtime
                .block_on(
                    backend
                        .queries
                        .date_range(&backend.connection, start, end, force_refresh),
                )
                .expect("date range should load")
        });
        *self.last_usage.borrow_mut() = Some(report.usage);
    }

    fn last_usage(&self) -> CallUsage {
        (*self.last_usage.borrow()).expect("a read should have completed")
    }
}

#[fixture]
fn world() -> CacheWorld {
    CacheWorld::new()
}

#[given("a connected system with an empty cache")]
fn a_connected_system_with_an_empty_cache(world: &CacheWorld) {
    world.connect();
}

#[when("the owner requests {days} days of history")]
fn the_owner_requests_days_of_history(world: &CacheWorld, days: u32) {
    world.request_history(days);
}

#[when("the owner requests the date range {start} to {end}")]
fn the_owner_requests_the_date_range(world: &CacheWorld, start: String, end: String) {
    world.request_range(&start, &end, false);
}

#[when("the owner forces a refresh of the date range {start} to {end}")]
fn the_owner_forces_a_refresh_of_the_date_range(world: &CacheWorld, start: String, end: String) {
    world.request_range(&start, &end, true);
}

#[then("the vendor was called {count} times for daily production")]
fn the_vendor_was_called_times_for_daily_production(world: &CacheWorld, count: usize) {
    let calls = world.with_backend(|backend| {
        backend
            .api
            .count(VendorEndpoint::DailySeries(DailySeriesKind::Production))
    });
    assert_eq!(calls, count, "unexpected daily production calls");
}

#[then("the history reports {days} available days")]
fn the_history_reports_available_days(world: &CacheWorld, days: usize) {
    assert_eq!(*world.available_days.borrow(), Some(days));
}

#[then("the last answer came from the cache")]
fn the_last_answer_came_from_the_cache(world: &CacheWorld) {
    let usage = world.last_usage();
    assert!(usage.from_cache(), "expected no vendor calls, got {usage:?}");
}

#[then("the last answer used {calls} vendor calls")]
fn the_last_answer_used_vendor_calls(world: &CacheWorld, calls: u32) {
    assert_eq!(world.last_usage().api_calls_used, calls);
}

#[scenario(
    path = "tests/features/cache_first_reads.feature",
    name = "A cold cache fetches the history once"
)]
fn a_cold_cache_fetches_the_history_once(world: CacheWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/cache_first_reads.feature",
    name = "A warm cache answers without vendor calls"
)]
fn a_warm_cache_answers_without_vendor_calls(world: CacheWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/cache_first_reads.feature",
    name = "A forced refresh refetches the date range"
)]
fn a_forced_refresh_refetches_the_date_range(world: CacheWorld) {
    drop(world);
}
