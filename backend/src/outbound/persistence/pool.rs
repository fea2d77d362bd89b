//! Shared `bb8` pool of `diesel-async` PostgreSQL connections.

use std::fmt;
use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use reqwest::Url;

/// Connections kept open by default.
pub const DEFAULT_POOL_MAX_SIZE: u32 = 10;
/// Seconds a repository waits for a free connection by default.
pub const DEFAULT_CHECKOUT_TIMEOUT_SECONDS: u64 = 5;

/// The pool could not start or hand out a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("database pool could not start: {message}")]
    Startup { message: String },
    #[error("no database connection within {timeout_seconds}s: {message}")]
    Exhausted { timeout_seconds: u64, message: String },
}

impl PoolError {
    /// Message without the variant prefix, for port error mapping.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Startup { message } | Self::Exhausted { message, .. } => message,
        }
    }
}

/// Where the pool connects and how large it grows.
#[derive(Clone)]
pub struct PoolConfig {
    database_url: String,
    max_size: u32,
    min_idle: Option<u32>,
    checkout_timeout: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: DEFAULT_POOL_MAX_SIZE,
            min_idle: None,
            checkout_timeout: Duration::from_secs(DEFAULT_CHECKOUT_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    #[must_use]
    pub fn with_min_idle(mut self, min_idle: Option<u32>) -> Self {
        self.min_idle = min_idle;
        self
    }

    #[must_use]
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// The URL with any password replaced, safe for logs.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.database_url) {
            Ok(mut url) if url.password().is_some() => {
                if url.set_password(Some("***")).is_err() {
                    return "<unprintable database url>".to_owned();
                }
                url.to_string()
            }
            Ok(url) => url.to_string(),
            Err(_) => "<unparsable database url>".to_owned(),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("database_url", &self.redacted_url())
            .field("max_size", &self.max_size)
            .field("min_idle", &self.min_idle)
            .field("checkout_timeout", &self.checkout_timeout)
            .finish()
    }
}

/// Cheap-to-clone handle shared by every Diesel repository.
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
    checkout_timeout: Duration,
}

impl DbPool {
    /// Build the pool, opening `min_idle` connections up front.
    ///
    /// # Errors
    /// [`PoolError::Startup`] when the URL is invalid or the database cannot
    /// be reached.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
        let inner = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.checkout_timeout)
            .build(manager)
            .await
            .map_err(|error| PoolError::Startup {
                message: error.to_string(),
            })?;
        Ok(Self {
            inner,
            checkout_timeout: config.checkout_timeout,
        })
    }

    /// Check out a connection.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] when none frees up within the checkout
    /// timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, PoolError> {
        self.inner.get().await.map_err(|error| PoolError::Exhausted {
            timeout_seconds: self.checkout_timeout.as_secs(),
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_and_overrides() {
        let config = PoolConfig::new("postgres://localhost/solarboard_test");
        assert_eq!(config.max_size, DEFAULT_POOL_MAX_SIZE);
        assert_eq!(config.min_idle, None);
        assert_eq!(config.checkout_timeout, Duration::from_secs(5));

        let config = config
            .with_max_size(0)
            .with_min_idle(Some(2))
            .with_checkout_timeout(Duration::from_secs(12));
        assert_eq!(config.max_size, 1);
        assert_eq!(config.min_idle, Some(2));
        assert_eq!(config.checkout_timeout, Duration::from_secs(12));
    }

    #[rstest]
    #[case("postgres://solar:hunter2@db:5432/solarboard", "postgres://solar:***@db:5432/solarboard")]
    #[case("postgres://db/solarboard", "postgres://db/solarboard")]
    #[case("not a url", "<unparsable database url>")]
    fn debug_output_hides_the_password(#[case] url: &str, #[case] shown: &str) {
        let config = PoolConfig::new(url);
        assert_eq!(config.redacted_url(), shown);
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains(shown));
    }

    #[rstest]
    fn exhausted_names_the_timeout() {
        let error = PoolError::Exhausted {
            timeout_seconds: 5,
            message: "timed out".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "no database connection within 5s: timed out"
        );
        assert_eq!(error.message(), "timed out");
    }
}
