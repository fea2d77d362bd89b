//! Cache-first behaviour of the data queries.

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone};
use rstest::rstest;

use super::*;
use crate::domain::ports::{VendorApiError, VendorEndpoint};
use crate::domain::{
    ErrorCode, ProductionRecord, RecordMetadata, SnapshotMetadata, SystemId, UserId,
};
use crate::test_support::{
    InMemoryApiCallLog, InMemoryConnections, InMemoryProductionRecords, MutableClock,
    StubMonitoringApi, StubOAuthClient, connection_fixture, daily_value, snapshot_fixture,
};

struct Harness {
    service: RangeQueryService,
    api: Arc<StubMonitoringApi>,
    oauth: Arc<StubOAuthClient>,
    records: Arc<InMemoryProductionRecords>,
    connections: Arc<InMemoryConnections>,
    connection: Connection,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 20, 15, 0, 0).single().expect("instant")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn harness() -> Harness {
    let connection =
        connection_fixture(UserId::random(), SystemId::new("808").expect("system"), now());
    let connections = Arc::new(InMemoryConnections::default());
    connections.insert(connection.clone());
    let records = Arc::new(InMemoryProductionRecords::default());
    let api = Arc::new(StubMonitoringApi::new(now().date_naive()));
    let oauth = Arc::new(StubOAuthClient::default());
    let clock = Arc::new(MutableClock::new(now()));
    let ledger = QuotaLedger::new(Arc::new(InMemoryApiCallLog::default()), clock.clone());
    let service = RangeQueryService::new(RangeQueryPorts {
        vault: TokenVault::new(connections.clone(), oauth.clone(), clock.clone()),
        fetcher: RangeFetcher::new(api.clone(), ledger.clone()),
        records: records.clone(),
        connections: connections.clone(),
        ledger,
        clock,
    });
    Harness {
        service,
        api,
        oauth,
        records,
        connections,
        connection,
    }
}

fn daily_rows(h: &Harness, source: RecordSource, days: impl Iterator<Item = NaiveDate>) {
    let rows: Vec<ProductionRecord> = days
        .map(|day| {
            ProductionRecord::daily_total(
                h.connection.id,
                h.connection.system_id.clone(),
                source,
                day,
                750,
            )
        })
        .collect();
    h.records.seed(&rows);
}

#[tokio::test]
async fn cached_history_needs_neither_vendor_nor_token() {
    let mut h = harness();
    h.connection.token_expires_at = now() - TimeDelta::hours(1);
    h.oauth.fail(VendorApiError::unauthorized(401_u16, "revoked"));
    let range = DateRange::trailing(now().date_naive(), 14).expect("range");
    daily_rows(&h, RecordSource::EnergyLifetimeDaily, range.days());

    let report = h.service.history(&h.connection, None).await.expect("history");

    assert!(report.usage.from_cache());
    assert!(h.api.calls().is_empty());
    assert_eq!(report.days.len(), 14);
    assert_eq!(report.total_wh, 14 * 750);
    assert!(report.days.iter().all(|day| day.available));
}

#[tokio::test]
async fn history_gap_costs_one_call_and_is_stored() {
    let h = harness();
    let gap = date(2026, 4, 15);
    let range = DateRange::trailing(now().date_naive(), 14).expect("range");
    daily_rows(
        &h,
        RecordSource::EnergyLifetimeDaily,
        range.days().filter(|day| *day != gap),
    );

    let report = h.service.history(&h.connection, Some(14)).await.expect("history");

    assert_eq!(report.usage.api_calls_used, 1);
    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 1);
    let filled = report
        .days
        .iter()
        .find(|day| day.date == gap)
        .expect("gap day present");
    assert_eq!(filled.energy_wh, daily_value(DailySeriesKind::Production));
    assert_eq!(
        h.records
            .count_source(h.connection.id, RecordSource::EnergyLifetimeDaily),
        14
    );

    let again = h.service.history(&h.connection, Some(14)).await.expect("history");
    assert!(again.usage.from_cache());
}

#[tokio::test]
async fn history_fills_only_the_missing_days_of_a_three_month_window() {
    let h = harness();
    let range = DateRange::trailing(now().date_naive(), 61).expect("range");
    let gap = DateRange::new(date(2026, 3, 10), date(2026, 3, 19)).expect("gap");
    daily_rows(
        &h,
        RecordSource::EnergyLifetimeDaily,
        range.days().filter(|day| !gap.contains(*day)),
    );

    let report = h.service.history(&h.connection, Some(61)).await.expect("history");

    assert_eq!(report.usage.api_calls_used, 1);
    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 1);
    assert_eq!(report.days.len(), 61);
    assert!(report.days.iter().all(|day| day.available));
    let fetched = daily_value(DailySeriesKind::Production);
    for day in &report.days {
        let expected = if gap.contains(day.date) { fetched } else { 750 };
        assert_eq!(day.energy_wh, expected, "energy on {}", day.date);
    }
    assert_eq!(report.total_wh, 51 * 750 + 10 * fetched);
    assert_eq!(
        h.records
            .count_source(h.connection.id, RecordSource::EnergyLifetimeDaily),
        61
    );
}

#[tokio::test]
async fn history_serves_cached_days_when_the_vendor_times_out() {
    let h = harness();
    let gap = date(2026, 4, 12);
    let range = DateRange::trailing(now().date_naive(), 14).expect("range");
    daily_rows(
        &h,
        RecordSource::EnergyLifetimeDaily,
        range.days().filter(|day| *day != gap),
    );
    h.api.fail(
        VendorEndpoint::DailySeries(DailySeriesKind::Production),
        VendorApiError::timeout(30_u64),
    );

    let report = h.service.history(&h.connection, Some(14)).await.expect("history");

    assert_eq!(report.usage.api_calls_used, 1);
    assert_eq!(report.days.len(), 14);
    assert_eq!(report.total_wh, 13 * 750);
    let missing: Vec<NaiveDate> = report
        .days
        .iter()
        .filter(|day| !day.available)
        .map(|day| day.date)
        .collect();
    assert_eq!(missing, vec![gap]);
}

#[rstest]
#[case(0)]
#[case(91)]
#[tokio::test]
async fn history_rejects_out_of_bounds_day_counts(#[case] days: u32) {
    let h = harness();
    let error = h
        .service
        .history(&h.connection, Some(days))
        .await
        .expect_err("invalid");
    assert_eq!(error.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn date_range_fetches_only_the_uncached_month() {
    let h = harness();
    let january = DateRange::new(date(2026, 1, 1), date(2026, 1, 31)).expect("range");
    let march = DateRange::new(date(2026, 3, 1), date(2026, 3, 31)).expect("range");
    daily_rows(&h, RecordSource::EnergyLifetime, january.days().chain(march.days()));

    let report = h
        .service
        .date_range(&h.connection, date(2026, 1, 1), date(2026, 3, 31), false)
        .await
        .expect("report");

    assert_eq!(report.usage.api_calls_used, 2);
    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 1);
    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Consumption)), 1);
    assert_eq!(report.days.len(), 90);
    let february = report
        .days
        .iter()
        .find(|day| day.date == date(2026, 2, 10))
        .expect("february day");
    assert_eq!(february.production_wh, daily_value(DailySeriesKind::Production));
    assert_eq!(february.consumption_wh, daily_value(DailySeriesKind::Consumption));
    assert_eq!(
        february.self_consumption_wh,
        daily_value(DailySeriesKind::Consumption)
    );
}

#[tokio::test]
async fn date_range_stops_asking_for_missing_consumption() {
    let h = harness();
    h.api.fail(
        VendorEndpoint::DailySeries(DailySeriesKind::Consumption),
        VendorApiError::unavailable(422_u16, "no meter"),
    );

    let report = h
        .service
        .date_range(&h.connection, date(2026, 1, 15), date(2026, 3, 15), false)
        .await
        .expect("report");

    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 3);
    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Consumption)), 1);
    assert_eq!(report.usage.api_calls_used, 4);
    assert_eq!(report.total_consumption_wh, 0);
    let stored = h.connections.get(h.connection.id).expect("connection");
    assert!(stored.consumption_unavailable);
}

#[tokio::test]
async fn date_range_keeps_fetched_production_when_consumption_fails() {
    let h = harness();
    h.api.fail(
        VendorEndpoint::DailySeries(DailySeriesKind::Consumption),
        VendorApiError::unavailable(503_u16, "maintenance"),
    );

    let report = h
        .service
        .date_range(&h.connection, date(2026, 3, 1), date(2026, 3, 31), false)
        .await
        .expect("report");

    assert_eq!(report.usage.api_calls_used, 2);
    assert_eq!(report.days.len(), 31);
    assert_eq!(
        report.total_production_wh,
        31 * daily_value(DailySeriesKind::Production)
    );
    assert_eq!(report.total_consumption_wh, 0);
    assert_eq!(
        h.records
            .count_source(h.connection.id, RecordSource::EnergyLifetime),
        31
    );
    let stored = h.connections.get(h.connection.id).expect("connection");
    assert!(!stored.consumption_unavailable);
}

#[tokio::test]
async fn date_range_continues_past_a_failed_month() {
    let h = harness();
    let january = DateRange::new(date(2026, 1, 1), date(2026, 1, 31)).expect("range");
    daily_rows(&h, RecordSource::EnergyLifetime, january.days());
    h.api.fail(
        VendorEndpoint::DailySeries(DailySeriesKind::Production),
        VendorApiError::timeout(30_u64),
    );

    let report = h
        .service
        .date_range(&h.connection, date(2026, 1, 1), date(2026, 3, 31), false)
        .await
        .expect("report");

    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 2);
    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Consumption)), 2);
    assert_eq!(report.usage.api_calls_used, 4);
    assert_eq!(report.total_production_wh, 31 * 750);
}

#[tokio::test]
async fn forced_refresh_refetches_cached_months() {
    let h = harness();
    let march = DateRange::new(date(2026, 3, 1), date(2026, 3, 31)).expect("range");
    daily_rows(&h, RecordSource::EnergyLifetime, march.days());

    h.service
        .date_range(&h.connection, march.start(), march.end(), true)
        .await
        .expect("report");

    assert_eq!(h.api.count(VendorEndpoint::DailySeries(DailySeriesKind::Production)), 1);
}

#[tokio::test]
async fn oversized_and_inverted_ranges_are_rejected() {
    let h = harness();
    let too_long = h
        .service
        .date_range(&h.connection, date(2025, 1, 1), date(2026, 1, 3), false)
        .await
        .expect_err("too long");
    assert_eq!(too_long.code(), ErrorCode::InvalidRequest);

    let inverted = h
        .service
        .date_range(&h.connection, date(2026, 2, 1), date(2026, 1, 1), false)
        .await
        .expect_err("inverted");
    assert_eq!(inverted.code(), ErrorCode::InvalidRequest);
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn stats_derive_month_production_from_lifetime_counters() {
    let h = harness();
    let snapshot = |at: DateTime<Utc>, lifetime: i64| {
        let mut row = snapshot_fixture(h.connection.id, at);
        row.metadata = RecordMetadata::Snapshot(SnapshotMetadata {
            energy_lifetime_wh: Some(lifetime),
            status: Some("normal".to_owned()),
            ..SnapshotMetadata::default()
        });
        row
    };
    h.records.seed(&[
        snapshot(Utc.with_ymd_and_hms(2026, 3, 31, 18, 0, 0).single().expect("instant"), 900_000),
        snapshot(Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).single().expect("instant"), 910_000),
        snapshot(Utc.with_ymd_and_hms(2026, 4, 20, 14, 0, 0).single().expect("instant"), 1_160_000),
    ]);

    let stats = h.service.stats(&h.connection).await.expect("stats");

    assert_eq!(stats.month_production_wh, 250_000);
    assert_eq!(stats.lifetime_production_wh, 1_160_000);
    assert_eq!(stats.status.as_deref(), Some("normal"));
    assert_eq!(stats.system_size_w, Some(6_000));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn stats_without_snapshots_are_zero() {
    let h = harness();
    let stats = h.service.stats(&h.connection).await.expect("stats");
    assert_eq!(stats.power_now_w, 0);
    assert_eq!(stats.month_production_wh, 0);
    assert_eq!(stats.last_update, None);
}
