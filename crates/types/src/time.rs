// Path: crates/types/src/time.rs

//! Epoch-millisecond clock helpers.
//!
//! Domain operations whose outcomes depend on time (expiry, TTL, rotation)
//! take an explicit `now_ms` argument so tests control the clock; callers at
//! the runtime boundary obtain it from [`now_ms`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one hour.
pub const HOUR_MS: u64 = 60 * 60 * 1000;
/// Milliseconds in one day.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// The current UTC time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_past_2024() {
        assert!(now_ms() > 1_704_067_200_000);
    }
}
