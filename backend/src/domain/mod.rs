//! Domain primitives, services, and ports.
//!
//! Purpose: keep the sync and caching rules independent of HTTP, SQL, and
//! the vendor wire format. Adapters reach the domain only through the traits
//! in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`) — API error response payload.
//! - ErrorCode (alias to `error::ErrorCode`) — stable error identifier.
//! - TokenVault, QuotaLedger, CacheGate, RangeFetcher, RecordWriter — the
//!   sync core components.
//! - SyncService — incremental and full-history syncs.
//! - ConnectionService, RangeQueryService, RefreshPolicy — use cases behind
//!   the HTTP routes.

pub mod cache_gate;
pub mod calendar;
pub mod connection;
pub mod connections;
pub mod error;
pub mod ports;
pub mod production;
pub mod quota_ledger;
pub mod range_fetcher;
pub mod range_queries;
pub mod record_writer;
pub mod refresh_policy;
pub mod sync;
pub mod sync_error;
pub mod token_vault;
pub mod trace_id;
pub mod user;

pub use self::cache_gate::{CacheGate, CachePlan, granularity_for};
pub use self::connection::{
    Connection, ConnectionId, DeletedConnection, NewConnection, SecretToken, SyncTarget,
    SystemDisplay, SystemId, TokenGrant,
};
pub use self::connections::ConnectionService;
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::production::{
    BatteryDeviceMetadata, ElectricalReadings, ProductionRecord, RecordId, RecordMetadata,
    RecordSource, SECONDS_PER_DAY, SnapshotMetadata, SnapshotPatch, StoredRecord,
};
pub use self::quota_ledger::{ApiCallLogEntry, DEFAULT_MONTHLY_LIMIT, QuotaLedger, QuotaUsage};
pub use self::range_fetcher::{RangeFetcher, SnapshotFetch};
pub use self::range_queries::{
    CallUsage, DailyEnergy, DateRangeReport, HistoryDay, HistoryReport, RangeQueryPorts,
    RangeQueryService, StatsReport,
};
pub use self::record_writer::RecordWriter;
pub use self::refresh_policy::{RefreshAllowance, RefreshPolicy};
pub use self::sync::{StepFailure, SyncReport, SyncService};
pub use self::sync_error::SyncError;
pub use self::token_vault::TokenVault;
pub use self::trace_id::TraceId;
pub use self::user::{AuthenticatedUser, UserId, UserRole};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use solarboard::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
