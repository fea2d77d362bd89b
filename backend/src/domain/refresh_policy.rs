//! Daily allowance for manual refreshes.

use std::sync::Arc;

use mockable::Clock;
use serde_json::json;
use tracing::warn;

use crate::domain::ports::RefreshAllowanceStore;
use crate::domain::{AuthenticatedUser, Error, UserRole};

/// Manual refreshes an admin may trigger per UTC day.
pub const DEFAULT_DAILY_REFRESH_LIMIT: u32 = 15;

/// Refreshes used today; `limit` is `None` for unlimited callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshAllowance {
    pub used: u32,
    pub limit: Option<u32>,
}

/// Gatekeeper for `POST /data/refresh`.
#[derive(Clone)]
pub struct RefreshPolicy {
    store: Arc<dyn RefreshAllowanceStore>,
    clock: Arc<dyn Clock>,
    daily_limit: u32,
}

impl RefreshPolicy {
    pub fn new(store: Arc<dyn RefreshAllowanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            daily_limit: DEFAULT_DAILY_REFRESH_LIMIT,
        }
    }

    #[must_use]
    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    /// Refuse viewers and admins who used up today's refreshes.
    ///
    /// Nothing is counted here; call [`Self::commit`] once the refresh has
    /// actually synced.
    pub async fn check(&self, user: &AuthenticatedUser) -> Result<RefreshAllowance, Error> {
        match user.role {
            UserRole::Viewer => Err(Error::forbidden("viewers cannot refresh data")),
            UserRole::SuperAdmin => Ok(RefreshAllowance {
                used: 0,
                limit: None,
            }),
            UserRole::Admin => {
                let today = self.clock.utc().date_naive();
                let used = self.store.count(&user.id, today).await.map_err(|error| {
                    warn!(user_id = %user.id, %error, "refresh allowance store failed");
                    Error::service_unavailable("refresh allowance unavailable")
                })?;
                if used >= self.daily_limit {
                    return Err(Error::too_many_requests(format!(
                        "daily limit of {} refreshes reached; try again tomorrow",
                        self.daily_limit
                    ))
                    .with_details(json!({
                        "refreshCount": used,
                        "maxRefreshes": self.daily_limit,
                    })));
                }
                Ok(RefreshAllowance {
                    used,
                    limit: Some(self.daily_limit),
                })
            }
        }
    }

    /// Count one completed refresh against `allowance`.
    ///
    /// Unlimited allowances are returned unchanged. A store failure is
    /// logged and the refresh is reported as counted.
    pub async fn commit(
        &self,
        user: &AuthenticatedUser,
        allowance: RefreshAllowance,
    ) -> RefreshAllowance {
        if allowance.limit.is_none() {
            return allowance;
        }
        let today = self.clock.utc().date_naive();
        let used = match self.store.increment(&user.id, today).await {
            Ok(used) => used,
            Err(error) => {
                warn!(user_id = %user.id, %error, "refresh not counted");
                allowance.used.saturating_add(1)
            }
        };
        RefreshAllowance { used, ..allowance }
    }
}
