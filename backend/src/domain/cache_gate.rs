//! Cache Gate: decides which calendar units still need a vendor fetch.
//!
//! A unit with at least one stored row is final. Values fetched once are
//! never re-checked for freshness; only an explicit forced refresh reopens
//! them. A zero-energy row still counts as present data.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::calendar::{CacheUnit, DateRange, Granularity, YearMonth};
use crate::domain::ports::ProductionRecordRepository;
use crate::domain::{ConnectionId, RecordSource, StoredRecord, SyncError};

/// Natural cache granularity of a source.
#[must_use]
pub fn granularity_for(source: RecordSource) -> Granularity {
    match source {
        RecordSource::EnergyLifetime | RecordSource::ConsumptionLifetime => Granularity::Month,
        _ => Granularity::Day,
    }
}

/// Outcome of a cache check.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePlan {
    /// Units with no stored rows, in calendar order.
    pub missing_units: Vec<CacheUnit>,
    /// Stored rows inside the requested range.
    pub cached_rows: Vec<StoredRecord>,
}

impl CachePlan {
    /// True when no fetch is needed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_units.is_empty()
    }

    /// One fetch window per calendar month with missing units.
    ///
    /// Day units collapse to the span from the first to the last missing day
    /// of their month; month units become the month clipped to `range`.
    #[must_use]
    pub fn fetch_windows(&self, range: &DateRange) -> Vec<DateRange> {
        let mut spans: BTreeMap<YearMonth, (NaiveDate, NaiveDate)> = BTreeMap::new();
        for unit in &self.missing_units {
            let (first, last) = match unit {
                CacheUnit::Day(day) => (*day, *day),
                CacheUnit::Month(month) => match range.clip_to_month(*month) {
                    Some(clipped) => (clipped.start(), clipped.end()),
                    None => continue,
                },
            };
            spans
                .entry(unit.month())
                .and_modify(|span| {
                    span.0 = span.0.min(first);
                    span.1 = span.1.max(last);
                })
                .or_insert((first, last));
        }
        spans
            .into_values()
            .filter_map(|(start, end)| DateRange::new(start, end).ok())
            .collect()
    }
}

/// Cost-control gate in front of the Range Fetcher.
#[derive(Clone)]
pub struct CacheGate {
    records: Arc<dyn ProductionRecordRepository>,
}

impl CacheGate {
    pub fn new(records: Arc<dyn ProductionRecordRepository>) -> Self {
        Self { records }
    }

    /// Check `range` for `source` rows of `connection`.
    ///
    /// Reads storage once over the unit-aligned span. With `force_refresh`
    /// every unit is reported missing and storage is not read.
    pub async fn plan(
        &self,
        connection: &ConnectionId,
        source: RecordSource,
        range: &DateRange,
        force_refresh: bool,
    ) -> Result<CachePlan, SyncError> {
        let granularity = granularity_for(source);
        let units = CacheUnit::decompose(granularity, range);
        if force_refresh {
            return Ok(CachePlan {
                missing_units: units,
                cached_rows: Vec::new(),
            });
        }

        let aligned_start = units.first().map_or(range.start(), |unit| unit.bounds().0);
        let aligned_end = units.last().map_or(range.end(), |unit| unit.bounds().1);
        let (from, until) = DateRange::new(aligned_start, aligned_end)
            .map_err(|error| SyncError::Persistence {
                message: error.to_string(),
            })?
            .instant_bounds();
        let rows = self
            .records
            .list_in_span(connection, source, from, until)
            .await?;

        let covered: HashSet<CacheUnit> = rows
            .iter()
            .map(|row| CacheUnit::containing(granularity, row.record.day()))
            .collect();
        let missing_units: Vec<CacheUnit> = units
            .into_iter()
            .filter(|unit| !covered.contains(unit))
            .collect();
        let cached_rows: Vec<StoredRecord> = rows
            .into_iter()
            .filter(|row| range.contains(row.record.day()))
            .collect();

        debug!(
            connection_id = %connection,
            %source,
            missing = missing_units.len(),
            cached = cached_rows.len(),
            "cache gate evaluated"
        );
        Ok(CachePlan {
            missing_units,
            cached_rows,
        })
    }
}
