//! Datetime parsing and display helpers
//!
//! Expiry timestamps arrive either as RFC3339 or as the short form
//! `YYYY-MM-DD HH:MM`, which is interpreted in the service's configured
//! timezone. Display formatting renders UTC timestamps back into that
//! timezone.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const SHORT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a user-supplied expiry timestamp.
pub fn parse_expiry_input(input: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, SHORT_FORMAT) {
        return tz
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| format!("'{input}' is ambiguous or invalid in timezone {tz}"));
    }

    Err(format!(
        "'{input}' is not a valid timestamp, expected RFC3339 or '{SHORT_FORMAT}'"
    ))
}

/// Render a UTC timestamp in the configured display timezone.
pub fn format_in_timezone(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc3339_with_offset() {
        let dt = parse_expiry_input("2026-10-25T14:30:00+02:00", chrono_tz::UTC).unwrap();
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn short_form_is_interpreted_in_the_given_timezone() {
        let dt = parse_expiry_input("2026-10-25 14:30", chrono_tz::Europe::Berlin).unwrap();
        // CET on that date is UTC+1 (after the DST change)
        assert_eq!(dt.to_rfc3339(), "2026-10-25T13:30:00+00:00");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_expiry_input("next tuesday", chrono_tz::UTC).is_err());
        assert!(parse_expiry_input("", chrono_tz::UTC).is_err());
    }

    #[test]
    fn display_formatting_uses_the_timezone() {
        let dt = "2026-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap();
        let rendered = format_in_timezone(dt, chrono_tz::UTC);
        assert!(rendered.starts_with("2026-01-02 03:04:05"));
    }
}
