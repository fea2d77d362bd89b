//! Scripted vendor doubles.
//!
//! Every call is recorded. Endpoints answer with small fixed payloads unless
//! a failure has been scripted for them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};

use crate::domain::calendar::DateRange;
use crate::domain::ports::{
    BatteryDeviceReading, BatteryInterval, DailySeries, DailySeriesKind, LatestTelemetry,
    MeterInterval, MeterKind, MonitoringApi, OAuthClient, SystemSummary, SystemsPage,
    TimeWindow, VendorApiError, VendorEndpoint, VendorSystem,
};
use crate::domain::{ElectricalReadings, SecretToken, SystemDisplay, SystemId, TokenGrant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("stub vendor mutex"),
    }
}

/// Days an unbounded daily series covers.
const DEFAULT_SERIES_DAYS: u32 = 60;

/// Watt-hours per day the stub reports for each daily series.
pub fn daily_value(kind: DailySeriesKind) -> i64 {
    match kind {
        DailySeriesKind::Production => 1_000,
        DailySeriesKind::Consumption => 600,
        DailySeriesKind::Import => 200,
        DailySeriesKind::Export => 500,
        DailySeriesKind::BatteryCharge => 300,
    }
}

/// A monitoring API that answers from fixed data.
pub struct StubMonitoringApi {
    today: NaiveDate,
    calls: Mutex<Vec<VendorEndpoint>>,
    failures: Mutex<HashMap<VendorEndpoint, VendorApiError>>,
    systems: Mutex<Vec<VendorSystem>>,
}

impl StubMonitoringApi {
    /// Unbounded daily series end on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            systems: Mutex::new(Vec::new()),
        }
    }

    /// Make every later call to `endpoint` fail with `error`.
    pub fn fail(&self, endpoint: VendorEndpoint, error: VendorApiError) {
        lock(&self.failures).insert(endpoint, error);
    }

    /// Undo a scripted failure for `endpoint`.
    pub fn recover(&self, endpoint: VendorEndpoint) {
        lock(&self.failures).remove(&endpoint);
    }

    /// Systems returned by the listing endpoint.
    pub fn with_systems(self, systems: Vec<VendorSystem>) -> Self {
        *lock(&self.systems) = systems;
        self
    }

    /// Endpoints called so far, in order.
    pub fn calls(&self) -> Vec<VendorEndpoint> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, endpoint: VendorEndpoint) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|called| **called == endpoint)
            .count()
    }

    fn record(&self, endpoint: VendorEndpoint) -> Result<(), VendorApiError> {
        lock(&self.calls).push(endpoint);
        match lock(&self.failures).get(&endpoint) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MonitoringApi for StubMonitoringApi {
    async fn summary(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
    ) -> Result<SystemSummary, VendorApiError> {
        self.record(VendorEndpoint::Summary)?;
        Ok(SystemSummary {
            energy_today_wh: 5_000,
            current_power_w: 1_500,
            energy_lifetime_wh: Some(1_000_000),
            status: Some("normal".to_owned()),
            display: SystemDisplay {
                name: Some("Stub array".to_owned()),
                size_w: Some(6_000),
                timezone: Some("Europe/Paris".to_owned()),
            },
        })
    }

    async fn latest_telemetry(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
    ) -> Result<LatestTelemetry, VendorApiError> {
        self.record(VendorEndpoint::LatestTelemetry)?;
        Ok(LatestTelemetry {
            production_power_w: Some(1_450),
            consumption_power_w: Some(900),
            battery_power_w: Some(-200),
        })
    }

    async fn daily_series(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
        kind: DailySeriesKind,
        window: Option<DateRange>,
    ) -> Result<DailySeries, VendorApiError> {
        self.record(VendorEndpoint::DailySeries(kind))?;
        let range = window.unwrap_or_else(|| DateRange::last_days(self.today, DEFAULT_SERIES_DAYS));
        let end = range.end().min(self.today);
        let days = (end - range.start()).num_days() + 1;
        Ok(DailySeries {
            start_date: range.start(),
            values_wh: vec![daily_value(kind); usize::try_from(days.max(0)).unwrap_or(0)],
        })
    }

    async fn meter_telemetry(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
        kind: MeterKind,
        window: TimeWindow,
    ) -> Result<Vec<MeterInterval>, VendorApiError> {
        self.record(VendorEndpoint::MeterTelemetry(kind))?;
        Ok(vec![MeterInterval {
            start_at: window.end - TimeDelta::minutes(15),
            end_at: window.end,
            power_w: 1_200,
            energy_wh: 300,
            electrical: ElectricalReadings {
                voltage: Some(231.0),
                ..ElectricalReadings::default()
            },
        }])
    }

    async fn battery_telemetry(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
        window: TimeWindow,
    ) -> Result<Vec<BatteryInterval>, VendorApiError> {
        self.record(VendorEndpoint::BatteryTelemetry)?;
        Ok(vec![BatteryInterval {
            start_at: window.end - TimeDelta::minutes(15),
            end_at: window.end,
            devices: vec![BatteryDeviceReading {
                serial_number: "BAT-1".to_owned(),
                power_w: -200,
                energy_wh: -50,
                percent_full: Some(76),
                temperature: Some(22.0),
                state: Some("discharging".to_owned()),
                max_cell_temp: Some(24.0),
            }],
        }])
    }

    async fn events(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
        _window: TimeWindow,
    ) -> Result<usize, VendorApiError> {
        self.record(VendorEndpoint::Events)?;
        Ok(3)
    }

    async fn alarms(
        &self,
        _system: &SystemId,
        _token: &SecretToken,
    ) -> Result<usize, VendorApiError> {
        self.record(VendorEndpoint::Alarms)?;
        Ok(0)
    }

    async fn systems(
        &self,
        _token: &SecretToken,
        page: u32,
        size: u32,
    ) -> Result<SystemsPage, VendorApiError> {
        self.record(VendorEndpoint::Systems)?;
        let systems = lock(&self.systems);
        let skip = usize::try_from(page.saturating_sub(1).saturating_mul(size)).unwrap_or(usize::MAX);
        Ok(SystemsPage {
            systems: systems
                .iter()
                .skip(skip)
                .take(usize::try_from(size).unwrap_or(usize::MAX))
                .cloned()
                .collect(),
            total: u64::try_from(systems.len()).unwrap_or(u64::MAX),
        })
    }
}

/// OAuth double issuing numbered token pairs.
#[derive(Default)]
pub struct StubOAuthClient {
    issued: Mutex<u32>,
    failure: Mutex<Option<VendorApiError>>,
}

impl StubOAuthClient {
    /// Make every later exchange fail with `error`.
    pub fn fail(&self, error: VendorApiError) {
        *lock(&self.failure) = Some(error);
    }

    /// Grants issued so far.
    pub fn issued(&self) -> u32 {
        *lock(&self.issued)
    }

    fn grant(&self) -> Result<TokenGrant, VendorApiError> {
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        let mut issued = lock(&self.issued);
        *issued += 1;
        let token = |prefix: &str| {
            SecretToken::new(format!("{prefix}-{}", *issued))
                .map_err(|error| VendorApiError::malformed(error.to_string()))
        };
        Ok(TokenGrant {
            access_token: token("access")?,
            refresh_token: token("refresh")?,
            expires_in_seconds: 86_400,
        })
    }
}

#[async_trait]
impl OAuthClient for StubOAuthClient {
    fn authorization_url(&self, state: &str) -> Result<String, VendorApiError> {
        Ok(format!("https://vendor.test/oauth/authorize?state={state}"))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, VendorApiError> {
        self.grant()
    }

    async fn refresh(&self, _refresh_token: &SecretToken) -> Result<TokenGrant, VendorApiError> {
        self.grant()
    }
}

