//! Cached telemetry rows and their per-category metadata.
//!
//! Every row carries a [`RecordSource`] naming the vendor endpoint that
//! produced it. Auxiliary fields live in [`RecordMetadata`], a closed sum
//! type keyed by category, so new sub-fields have to be added here rather
//! than appearing ad hoc in stored documents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::calendar::day_start;
use crate::domain::{ConnectionId, Error, SystemId};

/// Length of a daily aggregate interval.
pub const SECONDS_PER_DAY: i32 = 86_400;

/// Vendor endpoint category that produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Point-in-time system summary; the rolling snapshot.
    Summary,
    /// Daily production totals fetched for range queries.
    EnergyLifetime,
    /// Daily production totals backing the rolling history view.
    EnergyLifetimeDaily,
    /// Daily consumption totals.
    ConsumptionLifetime,
    ProductionMeter,
    ConsumptionMeter,
    /// Per-device battery intervals.
    BatteryTelemetry,
}

impl RecordSource {
    /// Stable storage tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::EnergyLifetime => "energy_lifetime",
            Self::EnergyLifetimeDaily => "energy_lifetime_daily",
            Self::ConsumptionLifetime => "consumption_lifetime",
            Self::ProductionMeter => "production_meter",
            Self::ConsumptionMeter => "consumption_meter",
            Self::BatteryTelemetry => "battery_telemetry",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "energy_lifetime" => Ok(Self::EnergyLifetime),
            "energy_lifetime_daily" => Ok(Self::EnergyLifetimeDaily),
            "consumption_lifetime" => Ok(Self::ConsumptionLifetime),
            "production_meter" => Ok(Self::ProductionMeter),
            "consumption_meter" => Ok(Self::ConsumptionMeter),
            "battery_telemetry" => Ok(Self::BatteryTelemetry),
            other => Err(Error::internal(format!("unknown record source: {other}"))),
        }
    }
}

/// Optional electrical measurements reported by meter intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElectricalReadings {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub frequency: Option<f64>,
    pub power_factor: Option<f64>,
}

/// Counters and status carried by summary snapshot rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_lifetime_wh: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_lifetime_wh: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_lifetime_wh: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_lifetime_wh: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_lifetime_wh: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_power_w: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_power_w: Option<i64>,
}

/// Battery device state attached to `battery_telemetry` rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryDeviceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_full: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cell_temp: Option<f64>,
}

/// Category-specific auxiliary fields, stored as a tagged JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordMetadata {
    Snapshot(SnapshotMetadata),
    DailyTotal,
    Meter,
    BatteryDevice(BatteryDeviceMetadata),
}

impl RecordMetadata {
    /// Merge enrichment fields into snapshot metadata.
    ///
    /// Rows that are not snapshots are replaced by a snapshot built from the
    /// patch alone.
    #[must_use]
    pub fn merged_with(self, patch: &SnapshotPatch) -> Self {
        let mut snapshot = match self {
            Self::Snapshot(existing) => existing,
            _ => SnapshotMetadata::default(),
        };
        patch.apply_to(&mut snapshot);
        Self::Snapshot(snapshot)
    }

    /// Snapshot fields, when this is snapshot metadata.
    #[must_use]
    pub fn as_snapshot(&self) -> Option<&SnapshotMetadata> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Progressive enrichment of the latest snapshot row.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotPatch {
    pub power_w: Option<i64>,
    pub energy_lifetime_wh: Option<i64>,
    pub consumption_lifetime_wh: Option<i64>,
    pub battery_lifetime_wh: Option<i64>,
    pub import_lifetime_wh: Option<i64>,
    pub export_lifetime_wh: Option<i64>,
    pub consumption_power_w: Option<i64>,
    pub battery_power_w: Option<i64>,
}

impl SnapshotPatch {
    fn apply_to(&self, target: &mut SnapshotMetadata) {
        let fields = [
            (&mut target.energy_lifetime_wh, self.energy_lifetime_wh),
            (&mut target.consumption_lifetime_wh, self.consumption_lifetime_wh),
            (&mut target.battery_lifetime_wh, self.battery_lifetime_wh),
            (&mut target.import_lifetime_wh, self.import_lifetime_wh),
            (&mut target.export_lifetime_wh, self.export_lifetime_wh),
            (&mut target.consumption_power_w, self.consumption_power_w),
            (&mut target.battery_power_w, self.battery_power_w),
        ];
        for (slot, value) in fields {
            if value.is_some() {
                *slot = value;
            }
        }
    }

    /// Whether the patch carries nothing to merge.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A normalised telemetry row, either a fetch candidate or a stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionRecord {
    pub connection_id: ConnectionId,
    pub system_id: SystemId,
    pub source: RecordSource,
    pub energy_wh: i64,
    pub power_w: i64,
    pub electrical: ElectricalReadings,
    /// Set for device-level rows only.
    pub device_serial: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Zero marks an instantaneous snapshot.
    pub interval_seconds: i32,
    pub metadata: RecordMetadata,
}

impl ProductionRecord {
    /// A daily aggregate row keyed at midnight UTC of `day`.
    #[must_use]
    pub fn daily_total(
        connection_id: ConnectionId,
        system_id: SystemId,
        source: RecordSource,
        day: NaiveDate,
        energy_wh: i64,
    ) -> Self {
        Self {
            connection_id,
            system_id,
            source,
            energy_wh,
            power_w: 0,
            electrical: ElectricalReadings::default(),
            device_serial: None,
            timestamp: day_start(day),
            interval_seconds: SECONDS_PER_DAY,
            metadata: RecordMetadata::DailyTotal,
        }
    }

    /// Key enforced unique by storage.
    #[must_use]
    pub fn dedup_key(&self) -> (ConnectionId, RecordSource, DateTime<Utc>, &str) {
        (
            self.connection_id,
            self.source,
            self.timestamp,
            self.device_serial.as_deref().unwrap_or_default(),
        )
    }

    /// Calendar day (UTC) the row's timestamp falls on.
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Storage-assigned row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub i64);

/// A row read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: ProductionRecord,
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(RecordSource::Summary)]
    #[case(RecordSource::EnergyLifetime)]
    #[case(RecordSource::EnergyLifetimeDaily)]
    #[case(RecordSource::ConsumptionLifetime)]
    #[case(RecordSource::ProductionMeter)]
    #[case(RecordSource::ConsumptionMeter)]
    #[case(RecordSource::BatteryTelemetry)]
    fn source_tags_parse_back(#[case] source: RecordSource) {
        assert_eq!(source.as_str().parse::<RecordSource>().expect("known tag"), source);
    }

    #[rstest]
    fn metadata_is_tagged_by_kind() {
        let metadata = RecordMetadata::Snapshot(SnapshotMetadata {
            status: Some("normal".to_owned()),
            energy_lifetime_wh: Some(1_200),
            ..SnapshotMetadata::default()
        });
        let value = serde_json::to_value(&metadata).expect("serialise");
        assert_eq!(
            value,
            json!({ "kind": "snapshot", "status": "normal", "energyLifetimeWh": 1200 })
        );
        let daily = serde_json::to_value(RecordMetadata::DailyTotal).expect("serialise");
        assert_eq!(daily, json!({ "kind": "daily_total" }));
    }

    #[rstest]
    fn unknown_metadata_kind_is_rejected() {
        let result = serde_json::from_value::<RecordMetadata>(json!({ "kind": "mystery" }));
        assert!(result.is_err());
    }

    #[rstest]
    fn patch_merges_only_supplied_fields() {
        let base = RecordMetadata::Snapshot(SnapshotMetadata {
            status: Some("normal".to_owned()),
            energy_lifetime_wh: Some(10),
            consumption_lifetime_wh: Some(20),
            ..SnapshotMetadata::default()
        });
        let patch = SnapshotPatch {
            consumption_lifetime_wh: Some(25),
            battery_power_w: Some(-300),
            ..SnapshotPatch::default()
        };
        let merged = base.merged_with(&patch);
        let snapshot = merged.as_snapshot().expect("snapshot metadata");
        assert_eq!(snapshot.status.as_deref(), Some("normal"));
        assert_eq!(snapshot.energy_lifetime_wh, Some(10));
        assert_eq!(snapshot.consumption_lifetime_wh, Some(25));
        assert_eq!(snapshot.battery_power_w, Some(-300));
    }

    #[rstest]
    fn empty_patch_is_detected() {
        assert!(SnapshotPatch::default().is_empty());
        let patch = SnapshotPatch {
            power_w: Some(1),
            ..SnapshotPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
