//! Parsing and formatting of human-entered byte sizes
//!
//! The `max_file_size` site setting is stored exactly as the admin typed it,
//! e.g. "5120MB"; this module turns it into bytes and back.

/// Parse a size string like "5120MB" or "200 KB" into bytes.
///
/// Units are KB (kilobytes) and MB (megabytes), case-insensitive, binary
/// multiples.
pub fn parse_byte_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("size must not be empty".to_string());
    }

    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("'{s}' is missing a unit, expected KB or MB"))?;
    let (number, unit) = s.split_at(digits_end);

    let value: u64 = number
        .parse()
        .map_err(|_| format!("'{s}' does not start with a number"))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "KB" => 1024,
        "MB" => 1024 * 1024,
        other => return Err(format!("unsupported unit '{other}', expected KB or MB")),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("'{s}' overflows the maximum representable size"))
}

/// Format a byte count for logs and error messages.
pub fn format_byte_size(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{bytes}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5120MB", 5120 * 1024 * 1024)]
    #[case("1KB", 1024)]
    #[case("200 KB", 200 * 1024)]
    #[case("10mb", 10 * 1024 * 1024)]
    #[case(" 1MB ", 1024 * 1024)]
    fn parses_valid_sizes(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(parse_byte_size(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("MB")]
    #[case("10")]
    #[case("10GB")]
    #[case("ten MB")]
    #[case("-5MB")]
    fn rejects_invalid_sizes(#[case] input: &str) {
        assert!(parse_byte_size(input).is_err());
    }

    #[test]
    fn formats_round_trip_for_common_values() {
        assert_eq!(format_byte_size(5120 * 1024 * 1024), "5120MB");
        assert_eq!(format_byte_size(200 * 1024), "200KB");
        assert_eq!(format_byte_size(999), "999B");
    }
}
