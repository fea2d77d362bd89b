//! Failure taxonomy for token handling and sync runs.

use crate::domain::Error;
use crate::domain::ports::{
    ConnectionRepositoryError, ProductionRecordRepositoryError, VendorApiError,
};

/// Errors surfaced by the Token Vault, the Range Fetcher, and the syncers.
///
/// Duplicate-key conflicts never appear here: the writer absorbs them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("no active connection found")]
    ConnectionNotFound,
    #[error("vendor rejected credentials: {message}")]
    UpstreamAuth { message: String },
    #[error("vendor call timed out: {message}")]
    UpstreamTimeout { message: String },
    #[error("vendor unavailable: {message}")]
    UpstreamUnavailable { status: u16, message: String },
    #[error("malformed vendor response: {message}")]
    MalformedUpstreamResponse { message: String },
    #[error("persistence failed: {message}")]
    Persistence { message: String },
}

impl SyncError {
    /// Whether the vendor reported the category as unsupported for the system.
    #[must_use]
    pub fn is_feature_unavailable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { status, .. }
                if *status == crate::domain::ports::FEATURE_UNAVAILABLE_STATUS
        )
    }
}

impl From<VendorApiError> for SyncError {
    fn from(error: VendorApiError) -> Self {
        let message = error.to_string();
        match error {
            VendorApiError::Unauthorized { .. } => Self::UpstreamAuth { message },
            VendorApiError::Timeout { .. } => Self::UpstreamTimeout { message },
            VendorApiError::Unavailable { status, .. } => {
                Self::UpstreamUnavailable { status, message }
            }
            VendorApiError::Transport { .. } => Self::UpstreamUnavailable { status: 0, message },
            VendorApiError::Malformed { .. } => Self::MalformedUpstreamResponse { message },
        }
    }
}

impl From<ConnectionRepositoryError> for SyncError {
    fn from(error: ConnectionRepositoryError) -> Self {
        Self::Persistence {
            message: error.to_string(),
        }
    }
}

impl From<ProductionRecordRepositoryError> for SyncError {
    fn from(error: ProductionRecordRepositoryError) -> Self {
        Self::Persistence {
            message: error.to_string(),
        }
    }
}

impl From<SyncError> for Error {
    fn from(error: SyncError) -> Self {
        match &error {
            SyncError::ConnectionNotFound => Self::not_found(error.to_string()),
            SyncError::UpstreamAuth { .. } => Self::bad_gateway(error.to_string())
                .with_details(serde_json::json!({ "reauthorize": true })),
            SyncError::MalformedUpstreamResponse { .. } => Self::bad_gateway(error.to_string()),
            SyncError::UpstreamTimeout { .. } | SyncError::UpstreamUnavailable { .. } => {
                Self::service_unavailable(error.to_string())
            }
            SyncError::Persistence { .. } => Self::internal(error.to_string()),
        }
    }
}
