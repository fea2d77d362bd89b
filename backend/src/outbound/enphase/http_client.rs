//! Reqwest-backed vendor adapter.
//!
//! Owns transport details only: URL and query construction, credentials,
//! the per-call timeout, HTTP status mapping, and JSON decoding into the
//! port's shapes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::dto::{
    BatteryTelemetryDto, CountedListDto, DailySeriesDto, LatestTelemetryDto, MeterTelemetryDto,
    SummaryDto, SystemsPageDto, TokenDto,
};
use crate::domain::calendar::DateRange;
use crate::domain::ports::{
    BatteryInterval, DailySeries, DailySeriesKind, LatestTelemetry, MeterInterval, MeterKind,
    MonitoringApi, OAuthClient, SystemSummary, SystemsPage, TimeWindow, VendorApiError,
    VendorEndpoint,
};
use crate::domain::{SecretToken, SystemId, TokenGrant};

/// Ceiling applied to every vendor call.
pub const DEFAULT_VENDOR_TIMEOUT_SECONDS: u64 = 30;

/// Vendor application credentials and endpoints.
pub struct EnphaseClientConfig {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub api_key: Zeroizing<String>,
    pub redirect_uri: String,
    pub timeout: Duration,
}

/// Monitoring and OAuth adapter for the vendor's v4 API.
pub struct EnphaseHttpClient {
    client: Client,
    base_url: Url,
    client_id: String,
    client_secret: Zeroizing<String>,
    api_key: Zeroizing<String>,
    redirect_uri: String,
    timeout_seconds: u64,
}

impl EnphaseHttpClient {
    /// Build the adapter with a reqwest client bounded by `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(config: EnphaseClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
            client_id: config.client_id,
            client_secret: config.client_secret,
            api_key: config.api_key,
            redirect_uri: config.redirect_uri,
            timeout_seconds: config.timeout.as_secs().max(1),
        })
    }

    fn url(&self, path: &str) -> Result<Url, VendorApiError> {
        self.base_url
            .join(path)
            .map_err(|error| VendorApiError::transport(format!("invalid vendor url: {error}")))
    }

    fn data_request(
        &self,
        endpoint: VendorEndpoint,
        system: &SystemId,
        token: &SecretToken,
    ) -> Result<RequestBuilder, VendorApiError> {
        let url = self.url(&endpoint.path(system))?;
        Ok(self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .query(&[("key", self.api_key.as_str())]))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, VendorApiError> {
        let response = request
            .send()
            .await
            .map_err(|error| self.map_transport_error(&error))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| self.map_transport_error(&error))?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        decode(body.as_ref())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, VendorApiError> {
        let request = self
            .client
            .post(self.url("/oauth/token")?)
            .basic_auth(&self.client_id, Some(self.client_secret.as_str()))
            .form(form);
        let dto: TokenDto = self.send(request).await?;
        dto.into_grant().map_err(VendorApiError::malformed)
    }

    fn map_transport_error(&self, error: &reqwest::Error) -> VendorApiError {
        if error.is_timeout() {
            VendorApiError::timeout(self.timeout_seconds)
        } else {
            VendorApiError::transport(error.to_string())
        }
    }
}

#[async_trait]
impl OAuthClient for EnphaseHttpClient {
    fn authorization_url(&self, state: &str) -> Result<String, VendorApiError> {
        let mut url = self.url("/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, VendorApiError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &SecretToken) -> Result<TokenGrant, VendorApiError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose()),
        ])
        .await
    }
}

#[async_trait]
impl MonitoringApi for EnphaseHttpClient {
    async fn summary(
        &self,
        system: &SystemId,
        token: &SecretToken,
    ) -> Result<SystemSummary, VendorApiError> {
        let request = self.data_request(VendorEndpoint::Summary, system, token)?;
        let dto: SummaryDto = self.send(request).await?;
        Ok(dto.into())
    }

    async fn latest_telemetry(
        &self,
        system: &SystemId,
        token: &SecretToken,
    ) -> Result<LatestTelemetry, VendorApiError> {
        let request = self.data_request(VendorEndpoint::LatestTelemetry, system, token)?;
        let dto: LatestTelemetryDto = self.send(request).await?;
        Ok(dto.into())
    }

    async fn daily_series(
        &self,
        system: &SystemId,
        token: &SecretToken,
        kind: DailySeriesKind,
        window: Option<DateRange>,
    ) -> Result<DailySeries, VendorApiError> {
        let mut request = self.data_request(VendorEndpoint::DailySeries(kind), system, token)?;
        if let Some(range) = window {
            request = request.query(&date_params(&range));
        }
        let dto: DailySeriesDto = self.send(request).await?;
        dto.into_series(kind).map_err(VendorApiError::malformed)
    }

    async fn meter_telemetry(
        &self,
        system: &SystemId,
        token: &SecretToken,
        kind: MeterKind,
        window: TimeWindow,
    ) -> Result<Vec<MeterInterval>, VendorApiError> {
        let request = self
            .data_request(VendorEndpoint::MeterTelemetry(kind), system, token)?
            .query(&epoch_params(window));
        let dto: MeterTelemetryDto = self.send(request).await?;
        dto.into_intervals().map_err(VendorApiError::malformed)
    }

    async fn battery_telemetry(
        &self,
        system: &SystemId,
        token: &SecretToken,
        window: TimeWindow,
    ) -> Result<Vec<BatteryInterval>, VendorApiError> {
        let request = self
            .data_request(VendorEndpoint::BatteryTelemetry, system, token)?
            .query(&epoch_params(window));
        let dto: BatteryTelemetryDto = self.send(request).await?;
        dto.into_intervals().map_err(VendorApiError::malformed)
    }

    async fn events(
        &self,
        system: &SystemId,
        token: &SecretToken,
        window: TimeWindow,
    ) -> Result<usize, VendorApiError> {
        let request = self
            .data_request(VendorEndpoint::Events, system, token)?
            .query(&epoch_params(window));
        let dto: CountedListDto = self.send(request).await?;
        Ok(dto.count())
    }

    async fn alarms(
        &self,
        system: &SystemId,
        token: &SecretToken,
    ) -> Result<usize, VendorApiError> {
        let request = self.data_request(VendorEndpoint::Alarms, system, token)?;
        let dto: CountedListDto = self.send(request).await?;
        Ok(dto.count())
    }

    async fn systems(
        &self,
        token: &SecretToken,
        page: u32,
        size: u32,
    ) -> Result<SystemsPage, VendorApiError> {
        let request = self
            .client
            .get(self.url("/api/v4/systems")?)
            .bearer_auth(token.expose())
            .query(&[("key", self.api_key.as_str())])
            .query(&[("page", page), ("size", size)]);
        let dto: SystemsPageDto = self.send(request).await?;
        dto.into_page().map_err(VendorApiError::malformed)
    }
}

fn date_params(range: &DateRange) -> [(&'static str, String); 2] {
    [
        ("start_date", range.start().format("%Y-%m-%d").to_string()),
        ("end_date", range.end().format("%Y-%m-%d").to_string()),
    ]
}

fn epoch_params(window: TimeWindow) -> [(&'static str, i64); 2] {
    [
        ("start_at", window.start.timestamp()),
        ("end_at", window.end.timestamp()),
    ]
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, VendorApiError> {
    serde_json::from_slice(body).map_err(|error| {
        VendorApiError::malformed(format!(
            "invalid vendor JSON payload ({} bytes): {error}",
            body.len()
        ))
    })
}

fn map_status_error(status: StatusCode, body: &[u8]) -> VendorApiError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_owned()
    } else {
        preview
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VendorApiError::unauthorized(status.as_u16(), message)
        }
        _ => VendorApiError::unavailable(status.as_u16(), message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
