use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AgentscopeError, Result};
use crate::filter::TimeWindow;

/// Accepts an RFC 3339 instant or a humantime duration meaning "that long ago".
pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    parse_time_relative_to(input, Utc::now())
}

pub fn parse_time_relative_to(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    let ago = parse_duration_str(input).map_err(|_| {
        AgentscopeError::Parse(format!("expected RFC3339 time or duration, got {input}"))
    })?;
    let ago = chrono::Duration::from_std(ago)
        .map_err(|e| AgentscopeError::Parse(format!("duration out of range: {e}")))?;
    Ok(now - ago)
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input.trim())
        .map_err(|e| AgentscopeError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn parse_window(since: Option<&str>, until: Option<&str>) -> Result<TimeWindow> {
    let now = Utc::now();
    Ok(TimeWindow {
        since: since.map(|v| parse_time_relative_to(v, now)).transpose()?,
        until: until.map(|v| parse_time_relative_to(v, now)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_time_or_relative("2026-01-01T09:00:00+09:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn relative_duration_counts_back_from_now() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let ts = parse_time_relative_to("90m", now).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn window_from_args() {
        let window = parse_window(Some("1h"), None).unwrap();
        assert!(window.since.is_some());
        assert!(window.until.is_none());
        assert!(parse_window(Some("yesterday-ish"), None).is_err());
    }
}
