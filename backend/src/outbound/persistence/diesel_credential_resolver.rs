//! PostgreSQL-backed `CredentialResolver`.
//!
//! Bearer tokens are never stored; sessions are keyed by the hex SHA-256
//! digest of the presented value.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use mockable::Clock;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::ports::{CredentialResolver, CredentialResolverError};
use crate::domain::{AuthenticatedUser, UserId, UserRole};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::models::UserRow;
use super::pool::DbPool;
use super::schema::{user_sessions, users};

/// Hex SHA-256 digest used as the session key.
///
/// # Examples
/// ```
/// use solarboard::outbound::persistence::bearer_digest;
///
/// let digest = bearer_digest("token");
/// assert_eq!(digest.len(), 64);
/// assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn bearer_digest(bearer: &str) -> String {
    hex::encode(Sha256::digest(bearer.as_bytes()))
}

/// Resolves bearer tokens against unexpired, unrevoked sessions.
#[derive(Clone)]
pub struct DieselCredentialResolver {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselCredentialResolver {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

fn row_to_user(row: UserRow) -> Result<AuthenticatedUser, CredentialResolverError> {
    let role = row.role.parse::<UserRole>().map_err(|_| {
        warn!(user_id = %row.id, role = %row.role, "session user has an unknown role");
        CredentialResolverError::query("session user has an unknown role")
    })?;
    Ok(AuthenticatedUser {
        id: UserId::from_uuid(row.id),
        role,
        created_by: row.created_by.map(UserId::from_uuid),
    })
}

#[async_trait]
impl CredentialResolver for DieselCredentialResolver {
    async fn resolve(
        &self,
        bearer: &str,
    ) -> Result<Option<AuthenticatedUser>, CredentialResolverError> {
        let digest = bearer_digest(bearer);
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = user_sessions::table
            .inner_join(users::table)
            .filter(user_sessions::token_hash.eq(digest))
            .filter(user_sessions::revoked_at.is_null())
            .filter(user_sessions::expires_at.gt(now))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user).transpose()
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for digesting and role decoding.
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    #[rstest]
    fn digest_matches_known_vector() {
        assert_eq!(
            bearer_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[rstest]
    fn viewers_keep_their_creating_admin() {
        let admin = Uuid::new_v4();
        let user = row_to_user(UserRow {
            id: Uuid::new_v4(),
            role: "viewer".to_owned(),
            created_by: Some(admin),
        })
        .expect("valid row");
        assert_eq!(user.role, UserRole::Viewer);
        assert_eq!(user.data_owner(), UserId::from_uuid(admin));
    }

    #[rstest]
    fn unknown_roles_are_rejected() {
        let result = row_to_user(UserRow {
            id: Uuid::new_v4(),
            role: "root".to_owned(),
            created_by: None,
        });
        assert!(result.is_err());
    }
}
