//! Duration strings used across configuration sections.
//!
//! Unit strings such as `"10s"`, `"1m30s"` or `"500ms"` go through
//! `humantime`. A bare integer is read as nanoseconds, and `"0"` is zero.
//! Values must fit in `u64` nanoseconds.

use std::time::Duration;
use thiserror::Error;

/// Error returned when a duration string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration {input:?}: {reason}")]
    Invalid { input: String, reason: String },

    #[error("duration {0:?} out of range")]
    OutOfRange(String),
}

/// Parse a duration string.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Invalid {
            input: input.to_string(),
            reason: "empty".to_string(),
        });
    }
    if let Ok(nanos) = s.parse::<u64>() {
        return Ok(Duration::from_nanos(nanos));
    }

    let duration = humantime::parse_duration(&s.replace('µ', "u")).map_err(|e| match e {
        humantime::DurationError::NumberOverflow => DurationError::OutOfRange(input.to_string()),
        other => DurationError::Invalid {
            input: input.to_string(),
            reason: other.to_string(),
        },
    })?;
    if duration.as_nanos() > u128::from(u64::MAX) {
        return Err(DurationError::OutOfRange(input.to_string()));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("250µs").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_compound() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h 15m").unwrap(), Duration::from_secs(4500));
    }

    #[test]
    fn test_bare_integer_is_nanoseconds() {
        assert_eq!(parse_duration("1000").unwrap(), Duration::from_micros(1));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(
            parse_duration("99999999999h"),
            Err(DurationError::OutOfRange("99999999999h".to_string()))
        );
        assert!(matches!(parse_duration("585y"), Err(DurationError::OutOfRange(_))));
        assert!(parse_duration("500y").is_ok());
    }
}
