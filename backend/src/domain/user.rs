//! Authenticated caller identity and role-based data scoping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::Error;

/// Stable user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::invalid_request("user id must be a valid UUID"))
    }
}

/// Dashboard role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Viewer,
}

impl UserRole {
    /// Stable storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Viewer => "viewer",
        }
    }
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            other => Err(Error::internal(format!("unknown user role: {other}"))),
        }
    }
}

/// A caller resolved from a bearer credential.
///
/// Viewers carry the id of the admin that created them; they read that
/// admin's connections and never write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub role: UserRole,
    pub created_by: Option<UserId>,
}

impl AuthenticatedUser {
    /// The user whose connections this caller reads.
    ///
    /// A viewer without a creating admin falls back to itself and therefore
    /// sees nothing.
    #[must_use]
    pub fn data_owner(&self) -> UserId {
        match (self.role, self.created_by) {
            (UserRole::Viewer, Some(owner)) => owner,
            _ => self.id,
        }
    }

    /// Fail with `forbidden` for read-only callers.
    pub fn require_writer(&self) -> Result<(), Error> {
        if self.role == UserRole::Viewer {
            return Err(Error::forbidden("viewers cannot modify connections"));
        }
        Ok(())
    }

    /// Whether the caller may act on connections it does not own.
    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }
}
