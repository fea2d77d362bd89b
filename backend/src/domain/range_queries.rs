//! Cache-first read models over stored production rows.
//!
//! Each query asks the Cache Gate what is missing, fetches only that, stores
//! it, and answers from storage. A query over fully cached data makes no
//! vendor call and does not need a valid token.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use mockable::Clock;
use tracing::{info, warn};

use crate::domain::calendar::{DateRange, YearMonth, day_start};
use crate::domain::ports::{ConnectionRepository, DailySeriesKind, ProductionRecordRepository};
use crate::domain::range_fetcher::{RangeFetcher, daily_records};
use crate::domain::{
    CacheGate, Connection, Error, QuotaLedger, RecordSource, StoredRecord, SyncError, SyncTarget,
    TokenVault,
};

/// Days shown by the history view unless the caller asks otherwise.
pub const DEFAULT_HISTORY_DAYS: u32 = 14;
/// Largest history window accepted.
pub const MAX_HISTORY_DAYS: u32 = 90;
/// Largest explicit date range accepted, in days.
pub const MAX_RANGE_DAYS: i64 = 366;
/// Default electricity price used to value production.
pub const DEFAULT_PRICE_PER_KWH: f64 = 0.2062;

/// Production, consumption and their overlap for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyEnergy {
    pub date: NaiveDate,
    pub production_wh: i64,
    pub consumption_wh: i64,
    pub self_consumption_wh: i64,
}

/// Call accounting attached to every query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallUsage {
    /// Vendor calls made while answering this query.
    pub api_calls_used: u32,
    pub api_calls_this_month: u64,
    pub api_limit: u64,
}

impl CallUsage {
    #[must_use]
    pub fn from_cache(&self) -> bool {
        self.api_calls_used == 0
    }
}

/// Result of a date range query.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRangeReport {
    pub range: DateRange,
    pub days: Vec<DailyEnergy>,
    pub total_production_wh: i64,
    pub total_consumption_wh: i64,
    pub usage: CallUsage,
}

/// One day of the history view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub energy_wh: i64,
    pub cost: f64,
    /// False when the vendor had no value for the day either.
    pub available: bool,
}

/// Result of a history query.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryReport {
    pub days: Vec<HistoryDay>,
    pub price_per_kwh: f64,
    pub total_wh: i64,
    pub total_cost: f64,
    pub usage: CallUsage,
}

/// Headline figures from the latest snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
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

/// Value `energy_wh` at `price_per_kwh`, rounded to cents.
///
/// # Examples
/// ```
/// use solarboard::domain::range_queries::energy_cost;
///
/// assert_eq!(energy_cost(10_000, 0.2062), 2.06);
/// ```
#[must_use]
pub fn energy_cost(energy_wh: i64, price_per_kwh: f64) -> f64 {
    let kwh = energy_wh as f64 / 1_000.0;
    (kwh * price_per_kwh * 100.0).round() / 100.0
}

fn sum_by_day(rows: &[StoredRecord]) -> BTreeMap<NaiveDate, i64> {
    let mut totals = BTreeMap::new();
    for row in rows {
        let total = totals.entry(row.record.day()).or_insert(0_i64);
        *total = total.saturating_add(row.record.energy_wh);
    }
    totals
}

/// Query service behind the data routes.
#[derive(Clone)]
pub struct RangeQueryService {
    vault: TokenVault,
    gate: CacheGate,
    fetcher: RangeFetcher,
    records: Arc<dyn ProductionRecordRepository>,
    connections: Arc<dyn ConnectionRepository>,
    ledger: QuotaLedger,
    clock: Arc<dyn Clock>,
    price_per_kwh: f64,
}

/// Collaborators of [`RangeQueryService`].
pub struct RangeQueryPorts {
    pub vault: TokenVault,
    pub fetcher: RangeFetcher,
    pub records: Arc<dyn ProductionRecordRepository>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub ledger: QuotaLedger,
    pub clock: Arc<dyn Clock>,
}

impl RangeQueryService {
    pub fn new(ports: RangeQueryPorts) -> Self {
        Self {
            vault: ports.vault,
            gate: CacheGate::new(ports.records.clone()),
            fetcher: ports.fetcher,
            records: ports.records,
            connections: ports.connections,
            ledger: ports.ledger,
            clock: ports.clock,
            price_per_kwh: DEFAULT_PRICE_PER_KWH,
        }
    }

    #[must_use]
    pub fn with_price_per_kwh(mut self, price: f64) -> Self {
        self.price_per_kwh = price;
        self
    }

    async fn usage(&self, connection: &Connection, api_calls_used: u32) -> Result<CallUsage, Error> {
        let usage = self.ledger.usage(&connection.id).await?;
        Ok(CallUsage {
            api_calls_used,
            api_calls_this_month: usage.used,
            api_limit: usage.limit,
        })
    }

    async fn stored(
        &self,
        connection: &Connection,
        source: RecordSource,
        range: &DateRange,
    ) -> Result<Vec<StoredRecord>, SyncError> {
        let (from, until) = range.instant_bounds();
        Ok(self
            .records
            .list_in_span(&connection.id, source, from, until)
            .await?)
    }

    /// Fetch one daily series window and store its rows.
    ///
    /// Returns `false` when the vendor reported the series as absent.
    async fn backfill(
        &self,
        target: &SyncTarget,
        kind: DailySeriesKind,
        source: RecordSource,
        window: DateRange,
    ) -> Result<bool, SyncError> {
        let Some(series) = self.fetcher.daily_series(target, kind, Some(window)).await? else {
            return Ok(false);
        };
        let rows = daily_records(
            &series,
            &window,
            target.connection_id,
            &target.system_id,
            source,
        );
        let inserted = self.records.insert_batch(&rows).await?;
        info!(
            connection_id = %target.connection_id,
            %source,
            start = %window.start(),
            end = %window.end(),
            inserted,
            "backfilled daily rows"
        );
        Ok(true)
    }

    /// [`Self::backfill`] for read paths: a failed window is logged and
    /// yields `None`, leaving the caller to answer from stored rows.
    async fn try_backfill(
        &self,
        target: &SyncTarget,
        kind: DailySeriesKind,
        source: RecordSource,
        window: DateRange,
    ) -> Option<bool> {
        match self.backfill(target, kind, source, window).await {
            Ok(found) => Some(found),
            Err(error) => {
                warn!(
                    connection_id = %target.connection_id,
                    %source,
                    start = %window.start(),
                    end = %window.end(),
                    %error,
                    "backfill failed; serving cached rows"
                );
                None
            }
        }
    }

    /// Daily production and consumption between `start` and `end`.
    ///
    /// Windows the vendor fails to deliver are left empty rather than
    /// failing the query.
    pub async fn date_range(
        &self,
        connection: &Connection,
        start: NaiveDate,
        end: NaiveDate,
        force_refresh: bool,
    ) -> Result<DateRangeReport, Error> {
        let range = DateRange::new(start, end)?;
        if range.len_days() > MAX_RANGE_DAYS {
            return Err(Error::invalid_request(format!(
                "date range is limited to {MAX_RANGE_DAYS} days"
            )));
        }
        let plan = self
            .gate
            .plan(&connection.id, RecordSource::EnergyLifetime, &range, force_refresh)
            .await?;

        let mut api_calls_used = 0;
        if !plan.is_complete() {
            let target = self.vault.sync_target_for(connection).await?;
            let mut with_consumption = !connection.consumption_unavailable;
            for window in plan.fetch_windows(&range) {
                api_calls_used += 1;
                self.try_backfill(
                    &target,
                    DailySeriesKind::Production,
                    RecordSource::EnergyLifetime,
                    window,
                )
                .await;
                if !with_consumption {
                    continue;
                }
                api_calls_used += 1;
                let found = self
                    .try_backfill(
                        &target,
                        DailySeriesKind::Consumption,
                        RecordSource::ConsumptionLifetime,
                        window,
                    )
                    .await;
                if found == Some(false) {
                    with_consumption = false;
                    self.connections
                        .mark_consumption_unavailable(&connection.id)
                        .await
                        .map_err(SyncError::from)?;
                }
            }
        }

        let production = sum_by_day(&self.stored(connection, RecordSource::EnergyLifetime, &range).await?);
        let consumption =
            sum_by_day(&self.stored(connection, RecordSource::ConsumptionLifetime, &range).await?);
        let days: Vec<DailyEnergy> = range
            .days()
            .map(|date| {
                let production_wh = production.get(&date).copied().unwrap_or_default();
                let consumption_wh = consumption.get(&date).copied().unwrap_or_default();
                DailyEnergy {
                    date,
                    production_wh,
                    consumption_wh,
                    self_consumption_wh: production_wh.min(consumption_wh),
                }
            })
            .collect();
        Ok(DateRangeReport {
            range,
            total_production_wh: days
                .iter()
                .map(|day| day.production_wh)
                .fold(0, i64::saturating_add),
            total_consumption_wh: days
                .iter()
                .map(|day| day.consumption_wh)
                .fold(0, i64::saturating_add),
            days,
            usage: self.usage(connection, api_calls_used).await?,
        })
    }

    /// Daily production for the last `days` days, valued at the configured
    /// price. Days neither stored nor fetched are marked unavailable.
    pub async fn history(
        &self,
        connection: &Connection,
        days: Option<u32>,
    ) -> Result<HistoryReport, Error> {
        let days = days.unwrap_or(DEFAULT_HISTORY_DAYS);
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(Error::invalid_request(format!(
                "days must be between 1 and {MAX_HISTORY_DAYS}"
            )));
        }
        let today = self.clock.utc().date_naive();
        let range = DateRange::trailing(today, days)?;
        let plan = self
            .gate
            .plan(&connection.id, RecordSource::EnergyLifetimeDaily, &range, false)
            .await?;

        let mut api_calls_used = 0;
        let rows = if plan.is_complete() {
            plan.cached_rows
        } else {
            let target = self.vault.sync_target_for(connection).await?;
            for window in plan.fetch_windows(&range) {
                api_calls_used += 1;
                self.try_backfill(
                    &target,
                    DailySeriesKind::Production,
                    RecordSource::EnergyLifetimeDaily,
                    window,
                )
                .await;
            }
            self.stored(connection, RecordSource::EnergyLifetimeDaily, &range)
                .await?
        };

        let by_day = sum_by_day(&rows);
        let history: Vec<HistoryDay> = range
            .days()
            .map(|date| {
                let energy = by_day.get(&date).copied();
                let energy_wh = energy.unwrap_or_default();
                HistoryDay {
                    date,
                    energy_wh,
                    cost: energy_cost(energy_wh, self.price_per_kwh),
                    available: energy.is_some(),
                }
            })
            .collect();
        let total_wh = history
            .iter()
            .map(|day| day.energy_wh)
            .fold(0, i64::saturating_add);
        Ok(HistoryReport {
            days: history,
            price_per_kwh: self.price_per_kwh,
            total_wh,
            total_cost: energy_cost(total_wh, self.price_per_kwh),
            usage: self.usage(connection, api_calls_used).await?,
        })
    }

    /// Headline figures; never calls the vendor.
    ///
    /// Month production is the lifetime counter of the latest snapshot minus
    /// that of the first snapshot of the calendar month (UTC).
    pub async fn stats(&self, connection: &Connection) -> Result<StatsReport, Error> {
        let latest = self
            .records
            .latest_snapshot(&connection.id)
            .await
            .map_err(SyncError::from)?;
        let month_start = day_start(YearMonth::of(self.clock.utc().date_naive()).first_day());
        let first_of_month = self
            .records
            .first_snapshot_since(&connection.id, month_start)
            .await
            .map_err(SyncError::from)?;
        let usage = self.ledger.usage(&connection.id).await?;

        let snapshot = latest
            .as_ref()
            .and_then(|row| row.record.metadata.as_snapshot());
        let lifetime_now = snapshot
            .and_then(|meta| meta.energy_lifetime_wh)
            .unwrap_or_default();
        let lifetime_at_month_start = first_of_month
            .as_ref()
            .and_then(|row| row.record.metadata.as_snapshot())
            .and_then(|meta| meta.energy_lifetime_wh)
            .unwrap_or(lifetime_now);

        Ok(StatsReport {
            power_now_w: latest.as_ref().map_or(0, |row| row.record.power_w),
            consumption_now_w: snapshot.and_then(|meta| meta.consumption_power_w),
            battery_power_w: snapshot.and_then(|meta| meta.battery_power_w),
            today_production_wh: latest.as_ref().map_or(0, |row| row.record.energy_wh),
            month_production_wh: (lifetime_now - lifetime_at_month_start).max(0),
            lifetime_production_wh: lifetime_now,
            lifetime_consumption_wh: snapshot.and_then(|meta| meta.consumption_lifetime_wh),
            status: snapshot.and_then(|meta| meta.status.clone()),
            system_size_w: connection.display.size_w,
            last_update: latest.as_ref().map(|row| row.record.timestamp),
            api_calls_this_month: usage.used,
            api_limit: usage.limit,
        })
    }
}

#[cfg(test)]
mod tests;
