//! Duration strings in the `N[smhd]` config format.

use std::sync::OnceLock;
use std::time::Duration;

fn pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^(\d+)([smhd])$").unwrap())
}

/// Parses a duration string like `90s`, `5m`, `2h`, or `1d`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let captures = pattern().captures(s.trim())?;
    let count: u64 = captures[1].parse().ok()?;
    let unit_secs = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(count.checked_mul(unit_secs)?))
}

/// Renders a duration back into the largest exact config unit.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("10ms"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("1.5h"), None);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(parse_duration(" 60s "), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_format_picks_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
    }

    #[test]
    fn test_roundtrip() {
        for s in ["45s", "10m", "6h", "3d"] {
            assert_eq!(format_duration(parse_duration(s).unwrap()), s);
        }
    }
}
