//! Parsing utilities for human-readable configuration values
//!
//! Unlike silent fallbacks, these return `None` on malformed input so the
//! caller can report which variable was wrong.

use std::time::Duration;

/// Parse a human-readable size string (e.g., "10MB", "1GB", "512KB")
///
/// # Supported formats
/// - `"1GB"` - gigabytes
/// - `"10MB"` - megabytes
/// - `"512KB"` - kilobytes
/// - `"1024B"` or `"1024"` - bytes
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim().to_uppercase();
    let (num_str, multiplier) = split_unit(
        &s,
        &[("GB", 1024 * 1024 * 1024), ("MB", 1024 * 1024), ("KB", 1024), ("B", 1)],
    )
    .unwrap_or((s.as_str(), 1));

    num_str.trim().parse::<usize>().ok()?.checked_mul(multiplier)
}

/// Parse a duration string (e.g., "100ms", "30s", "5m", "1h", "14d")
///
/// A bare number is interpreted as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let (num_str, millis) = split_unit(
        &s,
        &[
            ("ms", 1),
            ("s", 1000),
            ("m", 60 * 1000),
            ("h", 60 * 60 * 1000),
            ("d", 24 * 60 * 60 * 1000u64),
        ],
    )
    .unwrap_or((s.as_str(), 1000));

    let n = num_str.trim().parse::<u64>().ok()?;
    n.checked_mul(millis).map(Duration::from_millis)
}

/// Parse a boolean flag ("true"/"false", "1"/"0", "yes"/"no", "on"/"off")
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// Longest suffixes must come first ("ms" before "s", "MB" before "B").
fn split_unit<'a, T: Copy>(s: &'a str, units: &[(&str, T)]) -> Option<(&'a str, T)> {
    units
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|rest| (rest, *mult)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1KB"), Some(1024));
        assert_eq!(parse_size("10MB"), Some(10 * 1024 * 1024));
        assert_eq!(parse_size("1GB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size("100"), Some(100));
        assert_eq!(parse_size("  5mb  "), Some(5 * 1024 * 1024));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("14d"), Some(Duration::from_secs(14 * 24 * 3600)));
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
