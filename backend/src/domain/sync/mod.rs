//! Incremental and full-history synchronisation.
//!
//! Both syncs are expressed as an ordered list of [`SyncStep`]s executed by
//! [`run_steps`]. Calls within one sync are strictly sequential; different
//! connections may sync at the same time.

mod guard;
mod steps;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{debug, info};

use crate::domain::calendar::DateRange;
use crate::domain::ports::{ConnectionRepository, DailySeriesKind, MeterKind, TimeWindow};
use crate::domain::range_fetcher::{RangeFetcher, daily_records, series_total};
use crate::domain::{
    Connection, RecordSource, RecordWriter, SnapshotPatch, SyncError, SyncTarget,
};

pub use guard::{SyncGuard, SyncPermit};
pub use steps::{StepFailure, StepOutcome, StepRequirement, StepRun, SyncStep, run_steps};

/// Window used when a connection has never synced.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;
/// Minimum gap between two event fetches in incremental mode.
pub const EVENTS_INTERVAL_HOURS: i64 = 6;
/// Days of daily totals the full-history sync persists.
pub const HISTORY_DAYS: u32 = 30;
/// Span of each production telemetry window in a full-history sync.
pub const TELEMETRY_WINDOW_DAYS: i64 = 7;

/// Result of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Vendor calls that succeeded.
    pub api_calls: u32,
    /// Optional steps that failed; the run still completed.
    pub failures: Vec<StepFailure>,
    /// Another sync for the same connection was already running.
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

impl From<StepRun> for SyncReport {
    fn from(run: StepRun) -> Self {
        Self {
            api_calls: run.api_calls,
            failures: run.failures,
            skipped: false,
        }
    }
}

/// Whether an incremental sync should fetch events.
///
/// # Examples
/// ```
/// use chrono::{TimeDelta, Utc};
/// use solarboard::domain::sync::events_due;
///
/// let now = Utc::now();
/// assert!(events_due(None, now));
/// assert!(!events_due(Some(now - TimeDelta::hours(2)), now));
/// assert!(events_due(Some(now - TimeDelta::hours(7)), now));
/// ```
#[must_use]
pub fn events_due(last_sync_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_sync_at.is_none_or(|last| now - last > TimeDelta::hours(EVENTS_INTERVAL_HOURS))
}

/// Production telemetry windows covering the last 30 days, newest first.
fn history_windows(now: DateTime<Utc>) -> [TimeWindow; 4] {
    let days_back = |days: i64| now - TimeDelta::days(days);
    [
        TimeWindow {
            start: days_back(TELEMETRY_WINDOW_DAYS),
            end: now,
        },
        TimeWindow {
            start: days_back(2 * TELEMETRY_WINDOW_DAYS),
            end: days_back(TELEMETRY_WINDOW_DAYS),
        },
        TimeWindow {
            start: days_back(3 * TELEMETRY_WINDOW_DAYS),
            end: days_back(2 * TELEMETRY_WINDOW_DAYS),
        },
        TimeWindow {
            start: days_back(i64::from(HISTORY_DAYS)),
            end: days_back(3 * TELEMETRY_WINDOW_DAYS),
        },
    ]
}

fn lifetime_patch(kind: DailySeriesKind, total_wh: i64) -> SnapshotPatch {
    let total = Some(total_wh);
    match kind {
        DailySeriesKind::Production => SnapshotPatch {
            energy_lifetime_wh: total,
            ..SnapshotPatch::default()
        },
        DailySeriesKind::Consumption => SnapshotPatch {
            consumption_lifetime_wh: total,
            ..SnapshotPatch::default()
        },
        DailySeriesKind::Import => SnapshotPatch {
            import_lifetime_wh: total,
            ..SnapshotPatch::default()
        },
        DailySeriesKind::Export => SnapshotPatch {
            export_lifetime_wh: total,
            ..SnapshotPatch::default()
        },
        DailySeriesKind::BatteryCharge => SnapshotPatch {
            battery_lifetime_wh: total,
            ..SnapshotPatch::default()
        },
    }
}

/// Runs sync steps against one connection at a time.
#[derive(Clone)]
pub struct SyncService {
    connections: Arc<dyn ConnectionRepository>,
    fetcher: RangeFetcher,
    writer: RecordWriter,
    clock: Arc<dyn Clock>,
    guard: SyncGuard,
}

impl SyncService {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        fetcher: RangeFetcher,
        writer: RecordWriter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            fetcher,
            writer,
            clock,
            guard: SyncGuard::default(),
        }
    }

    /// Share an existing guard, so several services exclude each other.
    #[must_use]
    pub fn with_guard(mut self, guard: SyncGuard) -> Self {
        self.guard = guard;
        self
    }

    async fn load(&self, target: &SyncTarget) -> Result<Connection, SyncError> {
        self.connections
            .find_by_id(&target.connection_id)
            .await?
            .ok_or(SyncError::ConnectionNotFound)
    }

    /// Cheap periodic refresh: current state plus telemetry since the last
    /// sync.
    ///
    /// Optional step failures are reported in the result and do not stop
    /// `last_sync_at` from advancing.
    pub async fn sync_all_data(&self, target: &SyncTarget) -> Result<SyncReport, SyncError> {
        let Some(_permit) = self.guard.try_acquire(target.connection_id) else {
            info!(connection_id = %target.connection_id, "sync already running; skipped");
            return Ok(SyncReport::skipped());
        };
        let connection = self.load(target).await?;
        let now = self.clock.utc();
        let since = connection
            .last_sync_at
            .unwrap_or_else(|| now - TimeDelta::hours(DEFAULT_LOOKBACK_HOURS))
            .min(now);
        let window = TimeWindow { start: since, end: now };

        let mut steps = vec![
            SyncStep::mandatory("snapshot", self.snapshot_step(target)),
            SyncStep::mandatory("latest_telemetry", self.latest_telemetry_step(target)),
            SyncStep::mandatory(
                "production_telemetry",
                self.meter_step(target, MeterKind::Production, window),
            ),
        ];
        if connection.consumption_unavailable {
            debug!(connection_id = %target.connection_id, "consumption meter absent; not requested");
        } else {
            steps.push(SyncStep::optional(
                "consumption_telemetry",
                self.meter_step(target, MeterKind::Consumption, window),
            ));
        }
        steps.push(SyncStep::optional(
            "battery_telemetry",
            self.battery_step(target, window),
        ));
        if events_due(connection.last_sync_at, now) {
            steps.push(SyncStep::optional("events", self.events_step(target, window)));
        }

        let run = run_steps(steps).await?;
        self.connections
            .mark_synced(&target.connection_id, now)
            .await?;
        info!(
            connection_id = %target.connection_id,
            api_calls = run.api_calls,
            failures = run.failures.len(),
            "incremental sync finished"
        );
        Ok(run.into())
    }

    /// First-connection backfill: lifetime counters, 30 days of daily and
    /// interval data, events and alarms.
    pub async fn sync_full_history(&self, target: &SyncTarget) -> Result<SyncReport, SyncError> {
        let Some(_permit) = self.guard.try_acquire(target.connection_id) else {
            info!(connection_id = %target.connection_id, "sync already running; skipped");
            return Ok(SyncReport::skipped());
        };
        let connection = self.load(target).await?;
        let now = self.clock.utc();
        let week = TimeWindow {
            start: now - TimeDelta::days(TELEMETRY_WINDOW_DAYS),
            end: now,
        };
        let month = TimeWindow {
            start: now - TimeDelta::days(i64::from(HISTORY_DAYS)),
            end: now,
        };
        let with_consumption = !connection.consumption_unavailable;

        let mut steps = vec![
            SyncStep::mandatory("snapshot", self.snapshot_step(target)),
            SyncStep::optional("latest_telemetry", self.latest_telemetry_step(target)),
            SyncStep::optional("energy_lifetime", self.production_history_step(target, now)),
        ];
        if with_consumption {
            steps.push(SyncStep::optional(
                "consumption_lifetime",
                self.lifetime_counter_step(target, DailySeriesKind::Consumption),
            ));
        }
        steps.extend([
            SyncStep::optional(
                "import_lifetime",
                self.lifetime_counter_step(target, DailySeriesKind::Import),
            ),
            SyncStep::optional(
                "export_lifetime",
                self.lifetime_counter_step(target, DailySeriesKind::Export),
            ),
            SyncStep::optional(
                "battery_lifetime",
                self.lifetime_counter_step(target, DailySeriesKind::BatteryCharge),
            ),
        ]);
        for window in history_windows(now) {
            steps.push(SyncStep::optional(
                "production_telemetry",
                self.meter_step(target, MeterKind::Production, window),
            ));
        }
        if with_consumption {
            steps.push(SyncStep::optional(
                "consumption_telemetry",
                self.meter_step(target, MeterKind::Consumption, week),
            ));
        }
        steps.extend([
            SyncStep::optional("battery_telemetry", self.battery_step(target, week)),
            SyncStep::optional("events", self.events_step(target, month)),
            SyncStep::optional("alarms", self.alarms_step(target)),
        ]);

        let run = run_steps(steps).await?;
        self.connections
            .mark_synced(&target.connection_id, now)
            .await?;
        info!(
            connection_id = %target.connection_id,
            api_calls = run.api_calls,
            failures = run.failures.len(),
            "full-history sync finished"
        );
        Ok(run.into())
    }

    async fn snapshot_step(&self, target: &SyncTarget) -> Result<StepOutcome, SyncError> {
        let fetched = self.fetcher.snapshot(target).await?;
        self.writer.record_snapshot(fetched.record).await?;
        self.connections
            .update_display(&target.connection_id, &fetched.display)
            .await?;
        Ok(StepOutcome::ONE_CALL)
    }

    async fn latest_telemetry_step(&self, target: &SyncTarget) -> Result<StepOutcome, SyncError> {
        let patch = self.fetcher.latest_telemetry(target).await?;
        self.writer
            .enrich_snapshot(&target.connection_id, &patch)
            .await?;
        Ok(StepOutcome::ONE_CALL)
    }

    /// Production array: trailing daily rows plus the lifetime counter.
    async fn production_history_step(
        &self,
        target: &SyncTarget,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, SyncError> {
        let Some(series) = self
            .fetcher
            .daily_series(target, DailySeriesKind::Production, None)
            .await?
        else {
            return Ok(StepOutcome::Unavailable);
        };
        let range = DateRange::last_days(now.date_naive(), HISTORY_DAYS);
        let rows = daily_records(
            &series,
            &range,
            target.connection_id,
            &target.system_id,
            RecordSource::EnergyLifetimeDaily,
        );
        self.writer.write_batch(&rows).await?;
        self.writer
            .enrich_snapshot(
                &target.connection_id,
                &lifetime_patch(DailySeriesKind::Production, series_total(&series)),
            )
            .await?;
        Ok(StepOutcome::ONE_CALL)
    }

    async fn lifetime_counter_step(
        &self,
        target: &SyncTarget,
        kind: DailySeriesKind,
    ) -> Result<StepOutcome, SyncError> {
        let Some(series) = self.fetcher.daily_series(target, kind, None).await? else {
            self.mark_consumption_unavailable(target).await?;
            return Ok(StepOutcome::Unavailable);
        };
        self.writer
            .enrich_snapshot(&target.connection_id, &lifetime_patch(kind, series_total(&series)))
            .await?;
        Ok(StepOutcome::ONE_CALL)
    }

    async fn meter_step(
        &self,
        target: &SyncTarget,
        kind: MeterKind,
        window: TimeWindow,
    ) -> Result<StepOutcome, SyncError> {
        let Some(rows) = self.fetcher.meter_telemetry(target, kind, window).await? else {
            self.mark_consumption_unavailable(target).await?;
            return Ok(StepOutcome::Unavailable);
        };
        self.writer.write_batch(&rows).await?;
        Ok(StepOutcome::ONE_CALL)
    }

    async fn battery_step(
        &self,
        target: &SyncTarget,
        window: TimeWindow,
    ) -> Result<StepOutcome, SyncError> {
        let rows = self.fetcher.battery_telemetry(target, window).await?;
        self.writer.write_batch(&rows).await?;
        Ok(StepOutcome::ONE_CALL)
    }

    async fn events_step(
        &self,
        target: &SyncTarget,
        window: TimeWindow,
    ) -> Result<StepOutcome, SyncError> {
        let count = self.fetcher.events(target, window).await?;
        info!(connection_id = %target.connection_id, events = count, "vendor events fetched");
        Ok(StepOutcome::ONE_CALL)
    }

    async fn alarms_step(&self, target: &SyncTarget) -> Result<StepOutcome, SyncError> {
        let count = self.fetcher.alarms(target).await?;
        info!(connection_id = %target.connection_id, alarms = count, "vendor alarms fetched");
        Ok(StepOutcome::ONE_CALL)
    }

    async fn mark_consumption_unavailable(&self, target: &SyncTarget) -> Result<(), SyncError> {
        info!(connection_id = %target.connection_id, "no consumption meter; marking connection");
        self.connections
            .mark_consumption_unavailable(&target.connection_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
