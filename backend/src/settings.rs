//! Server settings loaded via OrthoConfig.
//!
//! Values layer from defaults, an optional config file, `SOLARBOARD_*`
//! environment variables, and command-line flags.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::FixedOffset;
use ortho_config::OrthoConfig;
use reqwest::Url;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::domain::quota_ledger::DEFAULT_MONTHLY_LIMIT;
use crate::domain::range_queries::DEFAULT_PRICE_PER_KWH;
use crate::domain::refresh_policy::DEFAULT_DAILY_REFRESH_LIMIT;
use crate::inbound::http::state::HttpStateOptions;
use crate::outbound::enphase::{DEFAULT_VENDOR_TIMEOUT_SECONDS, EnphaseClientConfig};
use crate::outbound::persistence::{
    DEFAULT_CHECKOUT_TIMEOUT_SECONDS, DEFAULT_POOL_MAX_SIZE, PoolConfig,
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_VENDOR_BASE_URL: &str = "https://api.enphaseenergy.com";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/api/v1/connections/enphase/callback";
const DEFAULT_DASHBOARD_URL: &str = "http://localhost:3000/dashboard";

/// Settings that cannot be turned into a running server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{name} is required")]
    Missing { name: &'static str },
    #[error("{name} is invalid: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Process configuration.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SOLARBOARD")]
pub struct Settings {
    /// Socket address the HTTP server binds.
    #[ortho_config(default = DEFAULT_BIND_ADDR.to_owned())]
    pub bind_addr: String,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    #[ortho_config(default = DEFAULT_POOL_MAX_SIZE)]
    pub pool_max_size: u32,
    pub pool_min_idle: Option<u32>,
    /// Seconds a query waits for a free pooled connection.
    #[ortho_config(default = DEFAULT_CHECKOUT_TIMEOUT_SECONDS)]
    pub pool_checkout_timeout_seconds: u64,
    /// Vendor API origin.
    #[ortho_config(default = DEFAULT_VENDOR_BASE_URL.to_owned())]
    pub vendor_base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_key: Option<String>,
    /// OAuth callback registered with the vendor.
    #[ortho_config(default = DEFAULT_REDIRECT_URI.to_owned())]
    pub redirect_uri: String,
    /// Browser destination after the OAuth callback.
    #[ortho_config(default = DEFAULT_DASHBOARD_URL.to_owned())]
    pub dashboard_url: String,
    #[ortho_config(default = DEFAULT_VENDOR_TIMEOUT_SECONDS)]
    pub request_timeout_seconds: u64,
    /// Soft monthly vendor call limit reported to clients.
    #[ortho_config(default = DEFAULT_MONTHLY_LIMIT)]
    pub quota_limit: u64,
    /// Offset whose calendar month bounds the quota.
    #[ortho_config(default = 0)]
    pub quota_utc_offset_minutes: i32,
    #[ortho_config(default = DEFAULT_DAILY_REFRESH_LIMIT)]
    pub daily_refresh_limit: u32,
    #[ortho_config(default = DEFAULT_PRICE_PER_KWH)]
    pub price_per_kwh: f64,
}

fn required<'a>(value: Option<&'a String>, name: &'static str) -> Result<&'a str, SettingsError> {
    value
        .map(String::as_str)
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(SettingsError::Missing { name })
}

impl Settings {
    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.bind_addr
            .parse()
            .map_err(|error: std::net::AddrParseError| SettingsError::Invalid {
                name: "bind_addr",
                message: error.to_string(),
            })
    }

    pub fn pool_config(&self) -> Result<PoolConfig, SettingsError> {
        let url = required(self.database_url.as_ref(), "database_url")?;
        Ok(PoolConfig::new(url)
            .with_max_size(self.pool_max_size)
            .with_min_idle(self.pool_min_idle)
            .with_checkout_timeout(Duration::from_secs(self.pool_checkout_timeout_seconds)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Vendor adapter configuration; every credential must be present.
    pub fn vendor_config(&self) -> Result<EnphaseClientConfig, SettingsError> {
        let base_url = Url::parse(&self.vendor_base_url).map_err(|error| SettingsError::Invalid {
            name: "vendor_base_url",
            message: error.to_string(),
        })?;
        Ok(EnphaseClientConfig {
            base_url,
            client_id: required(self.client_id.as_ref(), "client_id")?.to_owned(),
            client_secret: Zeroizing::new(
                required(self.client_secret.as_ref(), "client_secret")?.to_owned(),
            ),
            api_key: Zeroizing::new(required(self.api_key.as_ref(), "api_key")?.to_owned()),
            redirect_uri: self.redirect_uri.clone(),
            timeout: self.request_timeout(),
        })
    }

    pub fn quota_offset(&self) -> Result<FixedOffset, SettingsError> {
        let minutes = self.quota_utc_offset_minutes;
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(SettingsError::Invalid {
                name: "quota_utc_offset_minutes",
                message: format!("{minutes} minutes is outside +/-24h"),
            })
    }

    /// Tunables handed to the HTTP state.
    pub fn http_options(&self) -> Result<HttpStateOptions, SettingsError> {
        if !self.price_per_kwh.is_finite() || self.price_per_kwh < 0.0 {
            return Err(SettingsError::Invalid {
                name: "price_per_kwh",
                message: "must be a non-negative number".to_owned(),
            });
        }
        Ok(HttpStateOptions {
            dashboard_url: self.dashboard_url.clone(),
            monthly_limit: self.quota_limit,
            quota_offset: self.quota_offset()?,
            daily_refresh_limit: self.daily_refresh_limit,
            price_per_kwh: self.price_per_kwh,
        })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 8] = [
        "SOLARBOARD_BIND_ADDR",
        "SOLARBOARD_DATABASE_URL",
        "SOLARBOARD_CLIENT_ID",
        "SOLARBOARD_CLIENT_SECRET",
        "SOLARBOARD_API_KEY",
        "SOLARBOARD_QUOTA_LIMIT",
        "SOLARBOARD_QUOTA_UTC_OFFSET_MINUTES",
        "SOLARBOARD_PRICE_PER_KWH",
    ];

    fn load_with(overrides: &[(&str, &str)]) -> Settings {
        let _guard = lock_env(VARS.map(|name| {
            let value = overrides
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned());
            (name, value)
        }));
        Settings::load_from_iter([OsString::from("solarboard")]).expect("config should load")
    }

    #[rstest]
    fn defaults_apply_when_unset() {
        let settings = load_with(&[]);
        assert_eq!(
            settings.bind_addr().expect("bind addr"),
            "0.0.0.0:8080".parse::<SocketAddr>().expect("addr")
        );
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.pool_max_size, 10);
        assert_eq!(
            settings.redirect_uri,
            "http://localhost:8080/api/v1/connections/enphase/callback"
        );
        let options = settings.http_options().expect("options");
        assert_eq!(options.monthly_limit, 1_000);
        assert_eq!(options.daily_refresh_limit, 15);
        assert_eq!(options.quota_offset.local_minus_utc(), 0);
        assert!((options.price_per_kwh - 0.2062).abs() < f64::EPSILON);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let settings = load_with(&[
            ("SOLARBOARD_BIND_ADDR", "127.0.0.1:9000"),
            ("SOLARBOARD_QUOTA_LIMIT", "5000"),
            ("SOLARBOARD_QUOTA_UTC_OFFSET_MINUTES", "-300"),
            ("SOLARBOARD_CLIENT_ID", "app"),
            ("SOLARBOARD_CLIENT_SECRET", "shh"),
            ("SOLARBOARD_API_KEY", "key"),
        ]);
        assert_eq!(settings.bind_addr().expect("addr").port(), 9000);
        let options = settings.http_options().expect("options");
        assert_eq!(options.monthly_limit, 5_000);
        assert_eq!(options.quota_offset.local_minus_utc(), -18_000);
        let vendor = settings.vendor_config().expect("vendor config");
        assert_eq!(vendor.client_id, "app");
        assert_eq!(vendor.base_url.as_str(), "https://api.enphaseenergy.com/");
    }

    #[rstest]
    fn vendor_credentials_are_required() {
        let settings = load_with(&[("SOLARBOARD_CLIENT_ID", "app")]);
        assert!(matches!(
            settings.vendor_config(),
            Err(SettingsError::Missing { name: "client_secret" })
        ));
    }

    #[rstest]
    #[case("SOLARBOARD_QUOTA_UTC_OFFSET_MINUTES", "1500")]
    #[case("SOLARBOARD_PRICE_PER_KWH", "-1")]
    fn out_of_range_values_are_rejected(#[case] name: &str, #[case] value: &str) {
        let settings = load_with(&[(name, value)]);
        assert!(matches!(
            settings.http_options(),
            Err(SettingsError::Invalid { .. })
        ));
    }

    #[rstest]
    fn database_url_is_required_for_the_pool() {
        let settings = load_with(&[]);
        assert!(matches!(
            settings.pool_config(),
            Err(SettingsError::Missing { name: "database_url" })
        ));
        let settings = load_with(&[("SOLARBOARD_DATABASE_URL", "postgres://localhost/solar")]);
        assert_eq!(
            settings.pool_config().expect("pool").database_url(),
            "postgres://localhost/solar"
        );
    }
}
