//! Port for the vendor's OAuth2 authorisation server.

use async_trait::async_trait;

use crate::domain::{SecretToken, TokenGrant};

use super::VendorApiError;

/// Authorization-code and refresh-token exchanges.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Consent URL the browser is sent to; `state` comes back on the callback.
    fn authorization_url(&self, state: &str) -> Result<String, VendorApiError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, VendorApiError>;

    async fn refresh(&self, refresh_token: &SecretToken) -> Result<TokenGrant, VendorApiError>;
}
