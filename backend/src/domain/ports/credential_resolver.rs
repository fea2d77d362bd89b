//! Port resolving bearer credentials to callers.

use async_trait::async_trait;

use crate::domain::AuthenticatedUser;

use super::define_port_error;

define_port_error! {
    /// Errors raised while resolving credentials.
    pub enum CredentialResolverError {
        /// Backing store could not be reached.
        Connection { message: String } [transient] => "credential store unavailable: {message}",
        /// Lookup failed during execution.
        Query { message: String } => "credential lookup failed: {message}",
    }
}

/// Maps an opaque, revocable bearer credential to a caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// `Ok(None)` for unknown, expired, or revoked credentials.
    async fn resolve(
        &self,
        bearer: &str,
    ) -> Result<Option<AuthenticatedUser>, CredentialResolverError>;
}
