//! Shared error mapping for Diesel repository implementations.
//!
//! Every repository port exposes a `Connection` and a `Query` variant; the
//! [`StoreError`] trait lets one pair of mapping functions serve them all.

use tracing::debug;

use crate::domain::ports::{
    ApiCallLogRepositoryError, ConnectionRepositoryError, CredentialResolverError,
    ProductionRecordRepositoryError,
};

use super::pool::PoolError;

/// Port errors that distinguish an unreachable store from a failed query.
pub(crate) trait StoreError {
    fn from_connection(message: String) -> Self;
    fn from_query(message: String) -> Self;
}

macro_rules! impl_store_error {
    ($($error:ty),* $(,)?) => {
        $(
            impl StoreError for $error {
                fn from_connection(message: String) -> Self {
                    Self::connection(message)
                }

                fn from_query(message: String) -> Self {
                    Self::query(message)
                }
            }
        )*
    };
}

impl_store_error!(
    ApiCallLogRepositoryError,
    ConnectionRepositoryError,
    CredentialResolverError,
    ProductionRecordRepositoryError,
);

/// Map pool checkout failures to the port's connection variant.
pub(crate) fn map_pool_error<E: StoreError>(error: PoolError) -> E {
    E::from_connection(error.message().to_owned())
}

/// Map Diesel errors, hiding driver detail from the message.
pub(crate) fn map_diesel_error<E: StoreError>(error: diesel::result::Error) -> E {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => E::from_query("record not found".to_owned()),
        DieselError::QueryBuilderError(_) => E::from_query("database query error".to_owned()),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            E::from_connection("database connection error".to_owned())
        }
        _ => E::from_query("database error".to_owned()),
    }
}

/// Convert a stored non-negative counter back to `u64`.
pub(crate) fn row_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}
