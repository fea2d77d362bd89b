//! DTOs for decoding vendor JSON responses.
//!
//! Every payload is decoded into a transport DTO first and then converted
//! into the port's normalised shape in one pass. Missing numeric readings
//! default to zero the way the vendor omits idle intervals.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Deserialize;

use crate::domain::ports::{
    BatteryDeviceReading, BatteryInterval, DailySeries, DailySeriesKind, LatestTelemetry,
    MeterInterval, SystemSummary, SystemsPage, VendorSystem,
};
use crate::domain::{ElectricalReadings, SecretToken, SystemDisplay, SystemId, TokenGrant};

/// Interval length assumed when the vendor only reports `end_at`.
const DEFAULT_INTERVAL_SECONDS: i64 = 900;

#[derive(Debug, Deserialize)]
pub(super) struct TokenDto {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

impl TokenDto {
    pub(super) fn into_grant(self) -> Result<TokenGrant, String> {
        let access_token = SecretToken::new(self.access_token)
            .map_err(|_| "token response carried an empty access_token".to_owned())?;
        let refresh_token = SecretToken::new(self.refresh_token)
            .map_err(|_| "token response carried an empty refresh_token".to_owned())?;
        Ok(TokenGrant {
            access_token,
            refresh_token,
            expires_in_seconds: self.expires_in,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SummaryDto {
    #[serde(default)]
    current_power: Option<i64>,
    #[serde(default)]
    energy_today: Option<i64>,
    #[serde(default)]
    energy_lifetime: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "name")]
    system_name: Option<String>,
    #[serde(default)]
    size_w: Option<i64>,
    #[serde(default)]
    timezone: Option<String>,
}

impl From<SummaryDto> for SystemSummary {
    fn from(dto: SummaryDto) -> Self {
        Self {
            energy_today_wh: dto.energy_today.unwrap_or_default(),
            current_power_w: dto.current_power.unwrap_or_default(),
            energy_lifetime_wh: dto.energy_lifetime,
            status: dto.status,
            display: SystemDisplay {
                name: dto.system_name,
                size_w: dto.size_w,
                timezone: dto.timezone,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LatestTelemetryDto {
    #[serde(default)]
    production_power: Option<i64>,
    #[serde(default)]
    consumption_power: Option<i64>,
    #[serde(default)]
    battery_power: Option<i64>,
}

impl From<LatestTelemetryDto> for LatestTelemetry {
    fn from(dto: LatestTelemetryDto) -> Self {
        Self {
            production_power_w: dto.production_power,
            consumption_power_w: dto.consumption_power,
            battery_power_w: dto.battery_power,
        }
    }
}

/// Daily-array payloads share `start_date`; the values live under a key
/// that depends on the endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct DailySeriesDto {
    start_date: NaiveDate,
    #[serde(default)]
    production: Option<Vec<i64>>,
    #[serde(default)]
    consumption: Option<Vec<i64>>,
    #[serde(default)]
    import: Option<Vec<i64>>,
    #[serde(default)]
    export: Option<Vec<i64>>,
    #[serde(default)]
    charge: Option<Vec<i64>>,
}

impl DailySeriesDto {
    pub(super) fn into_series(self, kind: DailySeriesKind) -> Result<DailySeries, String> {
        let (key, values) = match kind {
            DailySeriesKind::Production => ("production", self.production),
            DailySeriesKind::Consumption => ("consumption", self.consumption),
            DailySeriesKind::Import => ("import", self.import),
            DailySeriesKind::Export => ("export", self.export),
            DailySeriesKind::BatteryCharge => ("charge", self.charge),
        };
        let values_wh = values.ok_or_else(|| format!("daily payload is missing `{key}`"))?;
        Ok(DailySeries {
            start_date: self.start_date,
            values_wh,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct MeterTelemetryDto {
    #[serde(default)]
    intervals: Vec<MeterIntervalDto>,
}

#[derive(Debug, Deserialize)]
struct MeterIntervalDto {
    #[serde(default)]
    start_at: Option<i64>,
    end_at: i64,
    #[serde(default)]
    powr: Option<i64>,
    #[serde(default, alias = "wh_del")]
    enwh: Option<i64>,
    #[serde(default)]
    voltage: Option<f64>,
    #[serde(default)]
    current: Option<f64>,
    #[serde(default)]
    frequency: Option<f64>,
    #[serde(default)]
    power_factor: Option<f64>,
}

impl MeterTelemetryDto {
    pub(super) fn into_intervals(self) -> Result<Vec<MeterInterval>, String> {
        self.intervals
            .into_iter()
            .map(|interval| {
                let (start_at, end_at) = bounds(interval.start_at, interval.end_at)?;
                Ok(MeterInterval {
                    start_at,
                    end_at,
                    power_w: interval.powr.unwrap_or_default(),
                    energy_wh: interval.enwh.unwrap_or_default(),
                    electrical: ElectricalReadings {
                        voltage: interval.voltage,
                        current: interval.current,
                        frequency: interval.frequency,
                        power_factor: interval.power_factor,
                    },
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BatteryTelemetryDto {
    #[serde(default)]
    intervals: Vec<BatteryIntervalDto>,
}

#[derive(Debug, Deserialize)]
struct BatteryIntervalDto {
    #[serde(default)]
    start_at: Option<i64>,
    end_at: i64,
    #[serde(default)]
    devices: Vec<BatteryDeviceDto>,
}

#[derive(Debug, Deserialize)]
struct BatteryDeviceDto {
    serial_number: String,
    #[serde(default)]
    power: Option<i64>,
    #[serde(default)]
    energy: Option<i64>,
    #[serde(default)]
    percent_full: Option<i32>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    max_cell_temp: Option<f64>,
}

impl BatteryTelemetryDto {
    pub(super) fn into_intervals(self) -> Result<Vec<BatteryInterval>, String> {
        self.intervals
            .into_iter()
            .map(|interval| {
                let (start_at, end_at) = bounds(interval.start_at, interval.end_at)?;
                let devices = interval
                    .devices
                    .into_iter()
                    .map(|device| BatteryDeviceReading {
                        serial_number: device.serial_number,
                        power_w: device.power.unwrap_or_default(),
                        energy_wh: device.energy.unwrap_or_default(),
                        percent_full: device.percent_full,
                        temperature: device.temperature,
                        state: device.state,
                        max_cell_temp: device.max_cell_temp,
                    })
                    .collect();
                Ok(BatteryInterval {
                    start_at,
                    end_at,
                    devices,
                })
            })
            .collect()
    }
}

/// Events and alarms are only counted.
#[derive(Debug, Deserialize)]
pub(super) struct CountedListDto {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default, alias = "alarms")]
    events: Vec<serde_json::Value>,
}

impl CountedListDto {
    pub(super) fn count(&self) -> usize {
        self.total.unwrap_or(self.events.len())
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SystemsPageDto {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    systems: Vec<SystemItemDto>,
}

#[derive(Debug, Deserialize)]
struct SystemItemDto {
    system_id: SystemIdDto,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    system_size: Option<i64>,
    #[serde(default)]
    timezone: Option<String>,
}

/// The vendor emits numeric ids; older payloads quote them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SystemIdDto {
    Number(u64),
    Text(String),
}

impl SystemsPageDto {
    pub(super) fn into_page(self) -> Result<SystemsPage, String> {
        let systems = self
            .systems
            .into_iter()
            .map(|item| {
                let raw = match item.system_id {
                    SystemIdDto::Number(id) => id.to_string(),
                    SystemIdDto::Text(id) => id,
                };
                let system_id =
                    SystemId::new(raw).map_err(|_| "system listing has a blank id".to_owned())?;
                Ok(VendorSystem {
                    system_id,
                    display: SystemDisplay {
                        name: item.name,
                        size_w: item.system_size,
                        timezone: item.timezone,
                    },
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        let total = self
            .total
            .unwrap_or_else(|| u64::try_from(systems.len()).unwrap_or(u64::MAX));
        Ok(SystemsPage { systems, total })
    }
}

fn bounds(start_at: Option<i64>, end_at: i64) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let end = epoch(end_at)?;
    let start = match start_at {
        Some(seconds) => epoch(seconds)?,
        None => end - TimeDelta::seconds(DEFAULT_INTERVAL_SECONDS),
    };
    Ok((start, end))
}

fn epoch(seconds: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| format!("timestamp {seconds} is out of range"))
}
