//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert hours (possibly fractional) to a chrono duration
///
/// Negative and non-finite inputs collapse to zero.
pub fn hours_to_duration(hours: f64) -> chrono::Duration {
    if !hours.is_finite() || hours <= 0.0 {
        return chrono::Duration::zero();
    }
    let millis = (hours * 3_600_000.0).round();
    if millis >= i64::MAX as f64 {
        return chrono::Duration::MAX;
    }
    chrono::Duration::milliseconds(millis as i64)
}

/// Age of `then` relative to `now`, zero if `then` lies in the future
pub fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> chrono::Duration {
    let age = now.signed_duration_since(then);
    if age < chrono::Duration::zero() {
        chrono::Duration::zero()
    } else {
        age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[tokio::test]
    async fn test_now_successive_calls_advance() {
        let time1 = now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let time2 = now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_hours_to_duration_whole_hours() {
        assert_eq!(hours_to_duration(24.0), chrono::Duration::hours(24));
    }

    #[test]
    fn test_hours_to_duration_fractional() {
        assert_eq!(hours_to_duration(0.5), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_hours_to_duration_invalid_inputs() {
        assert_eq!(hours_to_duration(-1.0), chrono::Duration::zero());
        assert_eq!(hours_to_duration(f64::NAN), chrono::Duration::zero());
        assert_eq!(hours_to_duration(f64::INFINITY), chrono::Duration::zero());
    }

    #[test]
    fn test_age_of_future_timestamp_is_zero() {
        let now = now();
        let later = now + chrono::Duration::seconds(30);
        assert_eq!(age(later, now), chrono::Duration::zero());
    }

    #[test]
    fn test_age_of_past_timestamp() {
        let now = now();
        let earlier = now - chrono::Duration::seconds(90);
        assert_eq!(age(earlier, now), chrono::Duration::seconds(90));
    }
}
