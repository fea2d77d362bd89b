//! Token Vault: hands out access tokens, refreshing them shortly before
//! they expire.
//!
//! The read-compare-refresh-write sequence is not isolated. Two concurrent
//! callers may both refresh; the last write wins.

use std::sync::Arc;

use chrono::TimeDelta;
use mockable::Clock;
use tracing::{info, warn};

use crate::domain::ports::{ConnectionRepository, OAuthClient};
use crate::domain::{Connection, SecretToken, SyncError, SyncTarget, UserId};

/// Tokens with less than this much lifetime left are refreshed.
pub const REFRESH_MARGIN_SECONDS: i64 = 5 * 60;

/// Owner of the OAuth token lifecycle.
#[derive(Clone)]
pub struct TokenVault {
    connections: Arc<dyn ConnectionRepository>,
    oauth: Arc<dyn OAuthClient>,
    clock: Arc<dyn Clock>,
}

impl TokenVault {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        oauth: Arc<dyn OAuthClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            oauth,
            clock,
        }
    }

    /// A usable access token for the user's active connection.
    ///
    /// # Errors
    /// [`SyncError::ConnectionNotFound`] when the user has no active
    /// connection; refresh failures propagate with the stored tokens intact.
    pub async fn ensure_valid_token(&self, user: &UserId) -> Result<SecretToken, SyncError> {
        let connection = self
            .connections
            .find_active_for_user(user)
            .await?
            .ok_or(SyncError::ConnectionNotFound)?;
        self.ensure_valid_token_for(&connection).await
    }

    /// As [`Self::ensure_valid_token`], for an already resolved connection.
    pub async fn ensure_valid_token_for(
        &self,
        connection: &Connection,
    ) -> Result<SecretToken, SyncError> {
        let now = self.clock.utc();
        let remaining = connection.token_lifetime_remaining(now);
        if remaining >= TimeDelta::seconds(REFRESH_MARGIN_SECONDS) {
            return Ok(connection.access_token.clone());
        }

        info!(
            connection_id = %connection.id,
            remaining_seconds = remaining.num_seconds(),
            "refreshing vendor access token"
        );
        let grant = self
            .oauth
            .refresh(&connection.refresh_token)
            .await
            .map_err(|error| {
                warn!(connection_id = %connection.id, %error, "token refresh failed");
                SyncError::from(error)
            })?;
        let expires_at = grant.expires_at(now);
        self.connections
            .update_tokens(&connection.id, &grant, expires_at)
            .await?;
        Ok(grant.access_token)
    }

    /// Sync scope for `connection` carrying a token that is valid right now.
    pub async fn sync_target_for(&self, connection: &Connection) -> Result<SyncTarget, SyncError> {
        let token = self.ensure_valid_token_for(connection).await?;
        Ok(connection.sync_target(token))
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ports::{MockConnectionRepository, MockOAuthClient, VendorApiError};
    use crate::domain::{SystemId, TokenGrant};
    use crate::test_support::{MutableClock, connection_fixture};
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::{fixture, rstest};

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("valid instant")
    }

    fn connection_expiring_in(now: DateTime<Utc>, minutes: i64) -> Connection {
        let mut connection =
            connection_fixture(UserId::random(), SystemId::new("77").expect("system id"), now);
        connection.token_expires_at = now + TimeDelta::minutes(minutes);
        connection
    }

    fn fresh_grant() -> TokenGrant {
        TokenGrant {
            access_token: SecretToken::new("new-access").expect("token"),
            refresh_token: SecretToken::new("new-refresh").expect("token"),
            expires_in_seconds: 86_400,
        }
    }

    fn vault(
        connections: MockConnectionRepository,
        oauth: MockOAuthClient,
        now: DateTime<Utc>,
    ) -> TokenVault {
        TokenVault::new(
            Arc::new(connections),
            Arc::new(oauth),
            Arc::new(MutableClock::new(now)),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn token_with_four_minutes_left_is_refreshed(now: DateTime<Utc>) {
        let connection = connection_expiring_in(now, 4);
        let connection_id = connection.id;
        let mut connections = MockConnectionRepository::new();
        connections
            .expect_find_active_for_user()
            .return_once(move |_| Ok(Some(connection)));
        connections
            .expect_update_tokens()
            .withf(move |id, grant, expires_at| {
                *id == connection_id
                    && grant.refresh_token.expose() == "new-refresh"
                    && *expires_at == now + TimeDelta::days(1)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut oauth = MockOAuthClient::new();
        oauth
            .expect_refresh()
            .times(1)
            .returning(|_| Ok(fresh_grant()));

        let token = vault(connections, oauth, now)
            .ensure_valid_token(&UserId::random())
            .await
            .expect("token");
        assert_eq!(token.expose(), "new-access");
    }

    #[rstest]
    #[tokio::test]
    async fn token_with_six_minutes_left_is_reused(now: DateTime<Utc>) {
        let connection = connection_expiring_in(now, 6);
        let stored = connection.access_token.clone();
        let mut connections = MockConnectionRepository::new();
        connections
            .expect_find_active_for_user()
            .return_once(move |_| Ok(Some(connection)));
        connections.expect_update_tokens().never();
        let mut oauth = MockOAuthClient::new();
        oauth.expect_refresh().never();

        let token = vault(connections, oauth, now)
            .ensure_valid_token(&UserId::random())
            .await
            .expect("token");
        assert_eq!(token, stored);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_connection_is_reported(now: DateTime<Utc>) {
        let mut connections = MockConnectionRepository::new();
        connections
            .expect_find_active_for_user()
            .returning(|_| Ok(None));

        let result = vault(connections, MockOAuthClient::new(), now)
            .ensure_valid_token(&UserId::random())
            .await;
        assert_eq!(result, Err(SyncError::ConnectionNotFound));
    }

    #[rstest]
    #[tokio::test]
    async fn failed_refresh_keeps_stored_tokens(now: DateTime<Utc>) {
        let connection = connection_expiring_in(now, 1);
        let mut connections = MockConnectionRepository::new();
        connections
            .expect_find_active_for_user()
            .return_once(move |_| Ok(Some(connection)));
        connections.expect_update_tokens().never();
        let mut oauth = MockOAuthClient::new();
        oauth
            .expect_refresh()
            .returning(|_| Err(VendorApiError::unauthorized(401_u16, "invalid_grant")));

        let result = vault(connections, oauth, now)
            .ensure_valid_token(&UserId::random())
            .await;
        assert!(matches!(result, Err(SyncError::UpstreamAuth { .. })));
    }
}
