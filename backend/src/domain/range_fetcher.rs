//! Range Fetcher: one vendor call per operation, normalised into rows.
//!
//! Nothing here persists. Every call, successful or not, is recorded in the
//! Quota Ledger with its latency.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::domain::calendar::DateRange;
use crate::domain::ports::{
    BatteryInterval, DailySeries, DailySeriesKind, MeterInterval, MeterKind, MonitoringApi,
    TimeWindow, VendorApiError, VendorEndpoint,
};
use crate::domain::{
    ApiCallLogEntry, BatteryDeviceMetadata, ConnectionId, ProductionRecord, QuotaLedger,
    RecordMetadata, RecordSource, SnapshotMetadata, SnapshotPatch, SyncError, SyncTarget,
    SystemDisplay, SystemId,
};

/// Summary row plus the display metadata that came with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFetch {
    pub record: ProductionRecord,
    pub display: SystemDisplay,
}

/// Value for `day` in a vendor daily array.
///
/// The array is indexed from its own `start_date`; days before the anchor or
/// past the end have no value.
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use solarboard::domain::ports::DailySeries;
/// use solarboard::domain::range_fetcher::value_on;
///
/// let series = DailySeries {
///     start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
///     values_wh: vec![10, 20, 30],
/// };
/// assert_eq!(value_on(&series, NaiveDate::from_ymd_opt(2026, 1, 3).unwrap()), Some(30));
/// assert_eq!(value_on(&series, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()), None);
/// ```
#[must_use]
pub fn value_on(series: &DailySeries, day: NaiveDate) -> Option<i64> {
    let offset = usize::try_from((day - series.start_date).num_days()).ok()?;
    series.values_wh.get(offset).copied()
}

/// Daily rows for every day of `range` the series covers.
///
/// Days outside the array are skipped with a warning, never clamped or
/// zero-filled. Zero values are kept.
#[must_use]
pub fn daily_records(
    series: &DailySeries,
    range: &DateRange,
    connection_id: ConnectionId,
    system_id: &SystemId,
    source: RecordSource,
) -> Vec<ProductionRecord> {
    range
        .days()
        .filter_map(|day| {
            let Some(energy_wh) = value_on(series, day) else {
                warn!(
                    %day,
                    start_date = %series.start_date,
                    values = series.values_wh.len(),
                    %source,
                    "day outside vendor daily array; skipped"
                );
                return None;
            };
            Some(ProductionRecord::daily_total(
                connection_id,
                system_id.clone(),
                source,
                day,
                energy_wh,
            ))
        })
        .collect()
}

/// Sum of a daily array, used as the lifetime counter.
///
/// Saturates instead of overflowing on hostile vendor values.
#[must_use]
pub fn series_total(series: &DailySeries) -> i64 {
    series
        .values_wh
        .iter()
        .fold(0, |total, value| total.saturating_add(*value))
}

fn meter_records(
    target: &SyncTarget,
    kind: MeterKind,
    intervals: Vec<MeterInterval>,
) -> Vec<ProductionRecord> {
    let source = match kind {
        MeterKind::Production => RecordSource::ProductionMeter,
        MeterKind::Consumption => RecordSource::ConsumptionMeter,
    };
    intervals
        .into_iter()
        .map(|interval| ProductionRecord {
            connection_id: target.connection_id,
            system_id: target.system_id.clone(),
            source,
            energy_wh: interval.energy_wh,
            power_w: interval.power_w,
            electrical: interval.electrical,
            device_serial: None,
            timestamp: interval.end_at,
            interval_seconds: interval_seconds(interval.start_at, interval.end_at),
            metadata: RecordMetadata::Meter,
        })
        .collect()
}

fn battery_records(target: &SyncTarget, intervals: Vec<BatteryInterval>) -> Vec<ProductionRecord> {
    intervals
        .into_iter()
        .flat_map(|interval| {
            let seconds = interval_seconds(interval.start_at, interval.end_at);
            let end_at = interval.end_at;
            interval.devices.into_iter().map(move |device| ProductionRecord {
                connection_id: target.connection_id,
                system_id: target.system_id.clone(),
                source: RecordSource::BatteryTelemetry,
                energy_wh: device.energy_wh,
                power_w: device.power_w,
                electrical: crate::domain::ElectricalReadings::default(),
                device_serial: Some(device.serial_number),
                timestamp: end_at,
                interval_seconds: seconds,
                metadata: RecordMetadata::BatteryDevice(BatteryDeviceMetadata {
                    percent_full: device.percent_full,
                    temperature: device.temperature,
                    state: device.state,
                    max_cell_temp: device.max_cell_temp,
                }),
            })
        })
        .collect()
}

fn interval_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    i32::try_from((end - start).num_seconds().max(0)).unwrap_or(i32::MAX)
}

/// Issues vendor calls on behalf of the syncers and range queries.
#[derive(Clone)]
pub struct RangeFetcher {
    api: Arc<dyn MonitoringApi>,
    ledger: QuotaLedger,
}

impl RangeFetcher {
    pub fn new(api: Arc<dyn MonitoringApi>, ledger: QuotaLedger) -> Self {
        Self { api, ledger }
    }

    async fn observe<T, Fut>(
        &self,
        target: &SyncTarget,
        endpoint: VendorEndpoint,
        call: Fut,
    ) -> Result<T, VendorApiError>
    where
        Fut: Future<Output = Result<T, VendorApiError>>,
    {
        let path = endpoint.path(&target.system_id);
        let started = Instant::now();
        let result = call.await;
        let latency = started.elapsed();
        let at = self.ledger.now();
        let entry = match &result {
            Ok(_) => ApiCallLogEntry::succeeded(target.connection_id, path, latency, at),
            Err(error) => {
                if matches!(error, VendorApiError::Timeout { .. }) {
                    warn!(connection_id = %target.connection_id, endpoint = %path, "vendor call timed out");
                }
                ApiCallLogEntry::failed(target.connection_id, path, error, latency, at)
            }
        };
        self.ledger.log_call(entry).await;
        result
    }

    /// `Ok(None)` when a consumption endpoint reports the meter as absent.
    fn tolerate_missing_meter<T>(
        endpoint: VendorEndpoint,
        result: Result<T, VendorApiError>,
    ) -> Result<Option<T>, SyncError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if endpoint.is_consumption() && error.is_feature_unavailable() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Current summary as a new snapshot row stamped with the fetch time.
    pub async fn snapshot(&self, target: &SyncTarget) -> Result<SnapshotFetch, SyncError> {
        let summary = self
            .observe(
                target,
                VendorEndpoint::Summary,
                self.api.summary(&target.system_id, &target.access_token),
            )
            .await?;
        let record = ProductionRecord {
            connection_id: target.connection_id,
            system_id: target.system_id.clone(),
            source: RecordSource::Summary,
            energy_wh: summary.energy_today_wh,
            power_w: summary.current_power_w,
            electrical: crate::domain::ElectricalReadings::default(),
            device_serial: None,
            timestamp: self.ledger.now(),
            interval_seconds: 0,
            metadata: RecordMetadata::Snapshot(SnapshotMetadata {
                status: summary.status.clone(),
                system_name: summary.display.name.clone(),
                energy_lifetime_wh: summary.energy_lifetime_wh,
                ..SnapshotMetadata::default()
            }),
        };
        Ok(SnapshotFetch {
            record,
            display: summary.display,
        })
    }

    /// Instantaneous power flows as a snapshot patch.
    pub async fn latest_telemetry(&self, target: &SyncTarget) -> Result<SnapshotPatch, SyncError> {
        let latest = self
            .observe(
                target,
                VendorEndpoint::LatestTelemetry,
                self.api.latest_telemetry(&target.system_id, &target.access_token),
            )
            .await?;
        Ok(SnapshotPatch {
            power_w: latest.production_power_w,
            consumption_power_w: latest.consumption_power_w,
            battery_power_w: latest.battery_power_w,
            ..SnapshotPatch::default()
        })
    }

    /// Raw daily array, optionally narrowed to `window`.
    pub async fn daily_series(
        &self,
        target: &SyncTarget,
        kind: DailySeriesKind,
        window: Option<DateRange>,
    ) -> Result<Option<DailySeries>, SyncError> {
        let endpoint = VendorEndpoint::DailySeries(kind);
        let result = self
            .observe(
                target,
                endpoint,
                self.api
                    .daily_series(&target.system_id, &target.access_token, kind, window),
            )
            .await;
        Self::tolerate_missing_meter(endpoint, result)
    }

    /// Interval rows for a meter.
    pub async fn meter_telemetry(
        &self,
        target: &SyncTarget,
        kind: MeterKind,
        window: TimeWindow,
    ) -> Result<Option<Vec<ProductionRecord>>, SyncError> {
        let endpoint = VendorEndpoint::MeterTelemetry(kind);
        let result = self
            .observe(
                target,
                endpoint,
                self.api
                    .meter_telemetry(&target.system_id, &target.access_token, kind, window),
            )
            .await;
        Ok(Self::tolerate_missing_meter(endpoint, result)?
            .map(|intervals| meter_records(target, kind, intervals)))
    }

    /// One row per battery device per interval.
    pub async fn battery_telemetry(
        &self,
        target: &SyncTarget,
        window: TimeWindow,
    ) -> Result<Vec<ProductionRecord>, SyncError> {
        let intervals = self
            .observe(
                target,
                VendorEndpoint::BatteryTelemetry,
                self.api
                    .battery_telemetry(&target.system_id, &target.access_token, window),
            )
            .await?;
        Ok(battery_records(target, intervals))
    }

    /// Event count in `window`.
    pub async fn events(&self, target: &SyncTarget, window: TimeWindow) -> Result<usize, SyncError> {
        Ok(self
            .observe(
                target,
                VendorEndpoint::Events,
                self.api.events(&target.system_id, &target.access_token, window),
            )
            .await?)
    }

    /// Open alarm count.
    pub async fn alarms(&self, target: &SyncTarget) -> Result<usize, SyncError> {
        Ok(self
            .observe(
                target,
                VendorEndpoint::Alarms,
                self.api.alarms(&target.system_id, &target.access_token),
            )
            .await?)
    }
}
