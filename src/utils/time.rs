//! Small time helpers shared across the watchdog.
//!
//! Grounded on the teacher's `utils/time.rs`: the crate never calls
//! `SystemTime::now()` ad hoc in business logic, it goes through a single
//! narrow surface so that tests can reason about instants explicitly.

use std::time::{Duration, SystemTime};

/// Parses a timestamp that may be RFC3339 or RFC3339-nano, treating the
/// zero-value sentinel as `None` per spec §4.9.
pub fn parse_runtime_timestamp(raw: &str) -> Option<SystemTime> {
    if raw.is_empty() || raw == "0001-01-01T00:00:00Z" {
        return None;
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&chrono::Utc)))
}

/// Formats a remaining duration for a cooldown/skip reason, e.g. `12s`.
pub fn remaining(until: SystemTime, now: SystemTime) -> Duration {
    until.duration_since(now).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinel_parses_to_none() {
        assert_eq!(parse_runtime_timestamp("0001-01-01T00:00:00Z"), None);
        assert_eq!(parse_runtime_timestamp(""), None);
    }

    #[test]
    fn rfc3339_nano_parses() {
        let parsed = parse_runtime_timestamp("2024-01-02T03:04:05.123456789Z");
        assert!(parsed.is_some());
    }

    #[test]
    fn remaining_never_negative() {
        let now = SystemTime::now();
        let past = now - Duration::from_secs(5);
        assert_eq!(remaining(past, now), Duration::ZERO);
    }
}
