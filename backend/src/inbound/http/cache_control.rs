//! Cache-control policy for authenticated responses.

/// Per-user telemetry must be revalidated before reuse and never shared.
pub const PRIVATE_NO_CACHE: &str = "private, no-cache, must-revalidate";

/// Header tuple for `HttpResponse::insert_header`.
pub const fn private_no_cache_header() -> (&'static str, &'static str) {
    ("Cache-Control", PRIVATE_NO_CACHE)
}
