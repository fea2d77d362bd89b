//! Vendor monitoring and OAuth adapter over HTTPS.
//!
//! The adapter maps vendor payloads into the monitoring port's shapes and
//! vendor failures into `VendorApiError`; call accounting happens in the
//! domain's quota ledger.

mod dto;
mod http_client;

pub use http_client::{DEFAULT_VENDOR_TIMEOUT_SECONDS, EnphaseClientConfig, EnphaseHttpClient};
