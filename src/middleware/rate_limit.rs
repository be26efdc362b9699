//! Per-IP request rate limiting.
//!
//! The limiter is a `tower_governor` token bucket keyed by client IP. The bucket
//! holds `burst_size` tokens and regains one every [`replenish_interval_ms`]
//! milliseconds.

/// Rates at or above this value turn rate limiting off.
pub const RATE_LIMIT_DISABLED_AT: u32 = 100_000;

/// Milliseconds between two replenished tokens for a sustained `requests_per_second`.
///
/// `GovernorConfigBuilder::per_second` takes the replenish period in seconds, not a
/// rate, so the period is derived here and passed to `per_millisecond`.
pub fn replenish_interval_ms(requests_per_second: u32) -> u64 {
    (1000 / u64::from(requests_per_second.max(1))).max(1)
}

/// Whether the configured rate leaves the limiter enabled.
pub fn rate_limit_enabled(requests_per_second: u32) -> bool {
    requests_per_second < RATE_LIMIT_DISABLED_AT
}
