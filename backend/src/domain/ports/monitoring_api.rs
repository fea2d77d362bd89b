//! Port for the vendor's system monitoring endpoints.
//!
//! Adapters translate vendor payloads into the normalised shapes below; the
//! domain never sees vendor JSON.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::calendar::DateRange;
use crate::domain::{ElectricalReadings, SecretToken, SystemDisplay, SystemId};

use super::VendorApiError;

/// Daily-array endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DailySeriesKind {
    Production,
    Consumption,
    Import,
    Export,
    BatteryCharge,
}

/// Interval meter endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Production,
    Consumption,
}

/// Vendor endpoint identity, shared by the adapter and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorEndpoint {
    Summary,
    LatestTelemetry,
    DailySeries(DailySeriesKind),
    MeterTelemetry(MeterKind),
    BatteryTelemetry,
    Events,
    Alarms,
    Systems,
}

impl VendorEndpoint {
    fn suffix(self) -> Option<&'static str> {
        let suffix = match self {
            Self::Summary => "summary",
            Self::LatestTelemetry => "latest_telemetry",
            Self::DailySeries(DailySeriesKind::Production) => "energy_lifetime",
            Self::DailySeries(DailySeriesKind::Consumption) => "consumption_lifetime",
            Self::DailySeries(DailySeriesKind::Import) => "energy_import_lifetime",
            Self::DailySeries(DailySeriesKind::Export) => "energy_export_lifetime",
            Self::DailySeries(DailySeriesKind::BatteryCharge) => "battery_lifetime",
            Self::MeterTelemetry(MeterKind::Production) => "telemetry/production_meter",
            Self::MeterTelemetry(MeterKind::Consumption) => "telemetry/consumption_meter",
            Self::BatteryTelemetry => "telemetry/battery",
            Self::Events => "events",
            Self::Alarms => "alarms",
            Self::Systems => return None,
        };
        Some(suffix)
    }

    /// Request path without host or query string.
    ///
    /// # Examples
    /// ```
    /// use solarboard::domain::SystemId;
    /// use solarboard::domain::ports::{MeterKind, VendorEndpoint};
    ///
    /// let system = SystemId::new("42").expect("system id");
    /// assert_eq!(
    ///     VendorEndpoint::MeterTelemetry(MeterKind::Production).path(&system),
    ///     "/api/v4/systems/42/telemetry/production_meter"
    /// );
    /// ```
    #[must_use]
    pub fn path(self, system: &SystemId) -> String {
        match self.suffix() {
            Some(suffix) => format!("/api/v4/systems/{system}/{suffix}"),
            None => "/api/v4/systems".to_owned(),
        }
    }

    /// Whether a 422 on this endpoint means "no such meter".
    #[must_use]
    pub fn is_consumption(self) -> bool {
        matches!(
            self,
            Self::DailySeries(DailySeriesKind::Consumption)
                | Self::MeterTelemetry(MeterKind::Consumption)
        )
    }
}

/// An instant window for interval telemetry and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Current system state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSummary {
    pub energy_today_wh: i64,
    pub current_power_w: i64,
    pub energy_lifetime_wh: Option<i64>,
    pub status: Option<String>,
    pub display: SystemDisplay,
}

/// Instantaneous power flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatestTelemetry {
    pub production_power_w: Option<i64>,
    pub consumption_power_w: Option<i64>,
    pub battery_power_w: Option<i64>,
}

/// Per-day values indexed from `start_date`.
///
/// The values are daily totals, not running lifetime counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySeries {
    pub start_date: NaiveDate,
    pub values_wh: Vec<i64>,
}

/// One meter interval.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterInterval {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub power_w: i64,
    pub energy_wh: i64,
    pub electrical: ElectricalReadings,
}

/// One battery device reading within an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryDeviceReading {
    pub serial_number: String,
    pub power_w: i64,
    pub energy_wh: i64,
    pub percent_full: Option<i32>,
    pub temperature: Option<f64>,
    pub state: Option<String>,
    pub max_cell_temp: Option<f64>,
}

/// A battery interval with its device readings.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryInterval {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub devices: Vec<BatteryDeviceReading>,
}

/// A system visible to the authorised vendor account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSystem {
    pub system_id: SystemId,
    pub display: SystemDisplay,
}

/// One page of the account's system listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemsPage {
    pub systems: Vec<VendorSystem>,
    pub total: u64,
}

/// Port for the vendor monitoring API. Every method issues exactly one call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    async fn summary(
        &self,
        system: &SystemId,
        token: &SecretToken,
    ) -> Result<SystemSummary, VendorApiError>;

    async fn latest_telemetry(
        &self,
        system: &SystemId,
        token: &SecretToken,
    ) -> Result<LatestTelemetry, VendorApiError>;

    /// Fetch a daily array; `window` narrows it when supplied.
    async fn daily_series(
        &self,
        system: &SystemId,
        token: &SecretToken,
        kind: DailySeriesKind,
        window: Option<DateRange>,
    ) -> Result<DailySeries, VendorApiError>;

    async fn meter_telemetry(
        &self,
        system: &SystemId,
        token: &SecretToken,
        kind: MeterKind,
        window: TimeWindow,
    ) -> Result<Vec<MeterInterval>, VendorApiError>;

    async fn battery_telemetry(
        &self,
        system: &SystemId,
        token: &SecretToken,
        window: TimeWindow,
    ) -> Result<Vec<BatteryInterval>, VendorApiError>;

    /// Number of events reported in `window`.
    async fn events(
        &self,
        system: &SystemId,
        token: &SecretToken,
        window: TimeWindow,
    ) -> Result<usize, VendorApiError>;

    /// Number of currently open alarms.
    async fn alarms(&self, system: &SystemId, token: &SecretToken)
    -> Result<usize, VendorApiError>;

    /// One page of the account's systems; `page` starts at 1.
    async fn systems(
        &self,
        token: &SecretToken,
        page: u32,
        size: u32,
    ) -> Result<SystemsPage, VendorApiError>;
}
