//! Connections between dashboard users and vendor-side solar systems.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::{Error, UserId};

/// Internal connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::invalid_request("connection id must be a valid UUID"))
    }
}

/// Vendor-assigned system identifier. Opaque, only required to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemId(String);

impl SystemId {
    /// Validate and construct a system id.
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_request("system id must not be empty"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SystemId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SystemId> for String {
    fn from(value: SystemId) -> Self {
        value.0
    }
}

/// OAuth token material. Wiped from memory on drop and redacted in `Debug`.
#[derive(Clone)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    /// Wrap a non-empty token.
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::invalid_request("token must not be empty"));
        }
        Ok(Self(Zeroizing::new(raw)))
    }

    /// Borrow the raw token for an outbound request.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for SecretToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SecretToken {}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Token pair issued by the vendor's OAuth endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: SecretToken,
    pub refresh_token: SecretToken,
    pub expires_in_seconds: i64,
}

impl TokenGrant {
    /// Absolute expiry for a grant received at `issued_at`.
    #[must_use]
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + Duration::seconds(self.expires_in_seconds.max(0))
    }
}

/// Denormalised display metadata copied from the vendor's system summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDisplay {
    pub name: Option<String>,
    pub size_w: Option<i64>,
    pub timezone: Option<String>,
}

impl SystemDisplay {
    /// Overlay `update` on `self`, keeping fields the update leaves unset.
    ///
    /// # Examples
    /// ```
    /// use solarboard::domain::SystemDisplay;
    ///
    /// let stored = SystemDisplay { name: Some("Roof".into()), size_w: Some(6000), timezone: None };
    /// let summary = SystemDisplay { name: None, size_w: Some(6400), timezone: None };
    /// let merged = stored.merged(&summary);
    /// assert_eq!(merged.name.as_deref(), Some("Roof"));
    /// assert_eq!(merged.size_w, Some(6400));
    /// ```
    #[must_use]
    pub fn merged(&self, update: &Self) -> Self {
        Self {
            name: update.name.clone().or_else(|| self.name.clone()),
            size_w: update.size_w.or(self.size_w),
            timezone: update.timezone.clone().or_else(|| self.timezone.clone()),
        }
    }
}

/// A user's link to one vendor system plus its OAuth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub system_id: SystemId,
    pub access_token: SecretToken,
    pub refresh_token: SecretToken,
    pub token_expires_at: DateTime<Utc>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub display: SystemDisplay,
    /// Set once the vendor reported no consumption meter for this system.
    pub consumption_unavailable: bool,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Time left before the stored access token expires.
    #[must_use]
    pub fn token_lifetime_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.token_expires_at - now
    }

    /// Build the triple a sync run needs.
    #[must_use]
    pub fn sync_target(&self, access_token: SecretToken) -> SyncTarget {
        SyncTarget {
            connection_id: self.id,
            system_id: self.system_id.clone(),
            access_token,
        }
    }
}

/// Input for the upsert performed after a successful OAuth exchange.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: UserId,
    pub system_id: SystemId,
    pub grant: TokenGrant,
    pub token_expires_at: DateTime<Utc>,
    pub display: SystemDisplay,
}

/// Everything a sync run is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub connection_id: ConnectionId,
    pub system_id: SystemId,
    pub access_token: SecretToken,
}

/// Rows removed by a disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletedConnection {
    pub production_records: u64,
    pub api_call_logs: u64,
}
