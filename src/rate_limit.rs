//! Fixed-rate throttling helpers for the search endpoints.
//!
//! Pages are spaced by a constant courtesy delay. A 429 ends the run rather
//! than backing off, so there is no adaptive state to keep here.

use std::time::Duration;

/// Default pause between two successful pages.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 2000;

/// Environment override for the page delay, in milliseconds.
pub const PAGE_DELAY_ENV: &str = "LEADSCOUT_PAGE_DELAY_MS";

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(3600)))
}
