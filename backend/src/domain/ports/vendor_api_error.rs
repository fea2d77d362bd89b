//! Failure taxonomy shared by the vendor OAuth and monitoring ports.

use super::define_port_error;

/// HTTP status the vendor uses for "this system has no such meter".
pub const FEATURE_UNAVAILABLE_STATUS: u16 = 422;

define_port_error! {
    /// Errors raised by vendor API adapters.
    pub enum VendorApiError {
        /// The vendor rejected the access token or the OAuth exchange.
        Unauthorized { status: u16, message: String } => "vendor rejected credentials ({status}): {message}",
        /// The per-call timeout elapsed.
        Timeout { seconds: u64 } [transient] => "Request timeout after {seconds}s",
        /// Non-success status other than an auth rejection.
        Unavailable { status: u16, message: String } [transient] => "vendor responded with status {status}: {message}",
        /// The request never produced a response.
        Transport { message: String } [transient] => "vendor transport error: {message}",
        /// The body did not match the expected shape.
        Malformed { message: String } => "malformed vendor response: {message}",
    }
}

impl VendorApiError {
    /// Status code recorded in the call log; zero when no response arrived.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { status, .. } | Self::Unavailable { status, .. } => *status,
            Self::Timeout { .. } | Self::Transport { .. } => 0,
            Self::Malformed { .. } => 200,
        }
    }

    /// Whether the vendor reported the category as unsupported for the system.
    #[must_use]
    pub fn is_feature_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { status, .. } if *status == FEATURE_UNAVAILABLE_STATUS)
    }
}
