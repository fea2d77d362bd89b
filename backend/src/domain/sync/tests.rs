//! Behaviour of the incremental and full-history syncs against in-memory
//! ports.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{VendorApiError, VendorEndpoint};
use crate::domain::{QuotaLedger, SystemId, UserId};
use crate::test_support::{
    InMemoryApiCallLog, InMemoryConnections, InMemoryProductionRecords, MutableClock,
    StubMonitoringApi, connection_fixture, daily_value, snapshot_fixture,
};

struct Harness {
    service: SyncService,
    api: Arc<StubMonitoringApi>,
    log: Arc<InMemoryApiCallLog>,
    ledger: QuotaLedger,
    records: Arc<InMemoryProductionRecords>,
    connections: Arc<InMemoryConnections>,
    connection: Connection,
    now: DateTime<Utc>,
}

impl Harness {
    fn target(&self) -> SyncTarget {
        self.connection.sync_target(self.connection.access_token.clone())
    }

    fn stored(&self) -> Connection {
        self.connections
            .get(self.connection.id)
            .expect("connection still stored")
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 14, 12, 0, 0).single().expect("instant")
}

fn harness_with(configure: impl FnOnce(&mut Connection)) -> Harness {
    let now = now();
    let mut connection =
        connection_fixture(UserId::random(), SystemId::new("4411").expect("system"), now);
    configure(&mut connection);
    let connections = Arc::new(InMemoryConnections::default());
    connections.insert(connection.clone());
    let records = Arc::new(InMemoryProductionRecords::default());
    let log = Arc::new(InMemoryApiCallLog::default());
    let api = Arc::new(StubMonitoringApi::new(now.date_naive()));
    let clock = Arc::new(MutableClock::new(now));
    let ledger = QuotaLedger::new(log.clone(), clock.clone());
    let service = SyncService::new(
        connections.clone(),
        RangeFetcher::new(api.clone(), ledger.clone()),
        RecordWriter::new(records.clone()),
        clock,
    );
    Harness {
        service,
        api,
        log,
        ledger,
        records,
        connections,
        connection,
        now,
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with(|_| {})
}

#[rstest]
#[tokio::test]
async fn full_history_makes_fifteen_logged_calls(harness: Harness) {
    let report = harness
        .service
        .sync_full_history(&harness.target())
        .await
        .expect("sync");

    assert_eq!(report.api_calls, 15);
    assert!(report.failures.is_empty());
    assert!(!report.skipped);
    let entries = harness.log.entries();
    assert_eq!(entries.len(), 15);
    assert!(entries.iter().all(|entry| entry.success));
    assert_eq!(
        harness
            .ledger
            .count_calls_this_month(&harness.connection.id)
            .await
            .expect("monthly count"),
        15
    );
    assert_eq!(harness.stored().last_sync_at, Some(harness.now));
}

#[rstest]
#[tokio::test]
async fn full_history_persists_thirty_days_and_lifetime_counters(harness: Harness) {
    harness
        .service
        .sync_full_history(&harness.target())
        .await
        .expect("sync");

    let id = harness.connection.id;
    let daily = harness.records.rows_for(id, RecordSource::EnergyLifetimeDaily);
    assert_eq!(daily.len(), 30);
    assert_eq!(daily.last().map(|row| row.day()), Some(harness.now.date_naive()));

    let snapshot = harness.records.latest(id).expect("snapshot");
    let metadata = snapshot.record.metadata.as_snapshot().expect("snapshot metadata");
    assert_eq!(
        metadata.energy_lifetime_wh,
        Some(60 * daily_value(DailySeriesKind::Production))
    );
    assert_eq!(
        metadata.import_lifetime_wh,
        Some(60 * daily_value(DailySeriesKind::Import))
    );
    assert_eq!(metadata.consumption_power_w, Some(900));
    assert_eq!(snapshot.record.power_w, 1_450);
    assert_eq!(
        harness.api.count(VendorEndpoint::MeterTelemetry(MeterKind::Production)),
        4
    );
}

#[rstest]
#[tokio::test]
async fn incremental_sync_two_hours_after_last_skips_events() {
    let harness = harness_with(|connection| {
        connection.last_sync_at = Some(now() - TimeDelta::hours(2));
    });

    let report = harness
        .service
        .sync_all_data(&harness.target())
        .await
        .expect("sync");

    assert_eq!(report.api_calls, 5);
    assert_eq!(harness.api.count(VendorEndpoint::Events), 0);
    assert_eq!(harness.log.entries().len(), 5);
    assert_eq!(harness.stored().last_sync_at, Some(harness.now));
}

#[rstest]
#[tokio::test]
async fn incremental_sync_keeps_existing_summary_rows() {
    let harness = harness_with(|connection| {
        connection.last_sync_at = Some(now() - TimeDelta::hours(2));
    });
    let id = harness.connection.id;
    let yesterday = harness.now - TimeDelta::days(1);
    harness.records.seed(&[
        snapshot_fixture(id, yesterday),
        snapshot_fixture(id, harness.now),
    ]);

    let report = harness
        .service
        .sync_all_data(&harness.target())
        .await
        .expect("sync");

    assert_eq!(report.api_calls, 5);
    assert_eq!(harness.api.count(VendorEndpoint::Events), 0);
    let summaries = harness.records.rows_for(id, RecordSource::Summary);
    let stamps: Vec<DateTime<Utc>> = summaries.iter().map(|row| row.timestamp).collect();
    assert_eq!(stamps, vec![yesterday, harness.now]);
    assert_eq!(summaries[0].power_w, 500);
}

#[rstest]
#[tokio::test]
async fn first_incremental_sync_fetches_events(harness: Harness) {
    let report = harness
        .service
        .sync_all_data(&harness.target())
        .await
        .expect("sync");

    assert_eq!(report.api_calls, 6);
    assert_eq!(harness.api.count(VendorEndpoint::Events), 1);
}

#[rstest]
#[tokio::test]
async fn missing_consumption_meter_is_remembered(harness: Harness) {
    harness.api.fail(
        VendorEndpoint::MeterTelemetry(MeterKind::Consumption),
        VendorApiError::unavailable(422_u16, "no consumption meter"),
    );

    let first = harness
        .service
        .sync_all_data(&harness.target())
        .await
        .expect("first sync");
    assert!(first.failures.is_empty());
    assert_eq!(first.api_calls, 5);
    assert!(harness.stored().consumption_unavailable);

    harness
        .service
        .sync_all_data(&harness.target())
        .await
        .expect("second sync");
    assert_eq!(
        harness.api.count(VendorEndpoint::MeterTelemetry(MeterKind::Consumption)),
        1
    );
}

#[rstest]
#[tokio::test]
async fn optional_failure_is_reported_and_sync_completes(harness: Harness) {
    harness.api.fail(
        VendorEndpoint::BatteryTelemetry,
        VendorApiError::unavailable(503_u16, "maintenance"),
    );

    let report = harness
        .service
        .sync_all_data(&harness.target())
        .await
        .expect("sync");

    assert_eq!(report.api_calls, 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "battery_telemetry");
    assert_eq!(harness.log.entries().len(), 6);
    assert_eq!(harness.stored().last_sync_at, Some(harness.now));
}

#[rstest]
#[tokio::test]
async fn mandatory_failure_aborts_without_advancing(harness: Harness) {
    harness
        .api
        .fail(VendorEndpoint::Summary, VendorApiError::timeout(30_u64));

    let result = harness.service.sync_all_data(&harness.target()).await;

    assert!(matches!(result, Err(SyncError::UpstreamTimeout { .. })));
    assert_eq!(harness.api.calls(), vec![VendorEndpoint::Summary]);
    assert_eq!(harness.stored().last_sync_at, None);
    let entries = harness.log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status_code, 0);
}

#[rstest]
#[tokio::test]
async fn concurrent_sync_for_same_connection_is_skipped(harness: Harness) {
    let guard = SyncGuard::default();
    let service = harness.service.clone().with_guard(guard.clone());
    let _running = guard
        .try_acquire(harness.connection.id)
        .expect("claim connection");

    let report = service
        .sync_full_history(&harness.target())
        .await
        .expect("sync");

    assert!(report.skipped);
    assert_eq!(report.api_calls, 0);
    assert!(harness.api.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn unknown_connection_is_not_found(harness: Harness) {
    let mut target = harness.target();
    target.connection_id = crate::domain::ConnectionId::random();

    let result = harness.service.sync_all_data(&target).await;
    assert_eq!(result, Err(SyncError::ConnectionNotFound));
}
