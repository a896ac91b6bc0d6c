//! Time helpers: the current second and the retry backoff shared by the sink.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use std::cmp;

/// Default ceiling for `backoff`, in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 500;

/// The current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    Utc.timestamp(Utc::now().timestamp(), 0)
}

/// How long to wait before the given reconnect attempt.
///
/// Zero attempts means no wait. After that the wait doubles from 2ms and is
/// capped at `max_ms`.
pub fn backoff(attempts: u32, max_ms: u64) -> Duration {
    if attempts == 0 {
        return Duration::from_millis(0);
    }
    let ms = if attempts < 63 {
        cmp::min(max_ms, 2u64.pow(attempts))
    } else {
        max_ms
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_zero_attempts_is_immediate() {
        assert_eq!(Duration::from_millis(0), backoff(0, 500));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(Duration::from_millis(2), backoff(1, 500));
        assert_eq!(Duration::from_millis(4), backoff(2, 500));
        assert_eq!(Duration::from_millis(256), backoff(8, 500));
        assert_eq!(Duration::from_millis(500), backoff(9, 500));
        assert_eq!(Duration::from_millis(500), backoff(u32::max_value(), 500));
    }

    #[test]
    fn now_has_second_resolution() {
        assert_eq!(0, now().timestamp_subsec_nanos());
    }
}
