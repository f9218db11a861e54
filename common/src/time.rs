//! Wall-clock helpers for logging, metrics and cache/log timestamps.
//!
//! Nothing in this crate treats these values as consensus-critical: leader
//! terms and log indices are the only things nodes must agree on, and those
//! never derive from wall time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type TimestampMillis = u64;

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

pub fn now_millis() -> TimestampMillis {
    since_epoch().as_millis() as u64
}

pub fn now_secs_f64() -> f64 {
    since_epoch().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_f64_is_monotonic_enough() {
        let a = now_secs_f64();
        let b = now_secs_f64();
        assert!(b >= a);
    }

    #[test]
    fn now_millis_nonzero() {
        assert!(now_millis() > 0);
    }
}
