use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str = "UTC";

pub fn normalize_timezone_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => DEFAULT_TIMEZONE.to_string(),
    }
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Unknown or blank names resolve to UTC.
pub fn get_timezone(name: Option<&str>) -> Tz {
    parse_timezone(&normalize_timezone_name(name)).unwrap_or(Tz::UTC)
}

pub fn to_timezone(dt: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    dt.with_timezone(&tz)
}

/// `YYYY-MM-DD HH:MM TZ`, e.g. `2024-01-15 09:30 EST`.
pub fn format_in_timezone(dt: DateTime<Utc>, tz: Tz) -> String {
    to_timezone(dt, tz).format("%Y-%m-%d %H:%M %Z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn blank_and_unknown_names_fall_back_to_utc() {
        assert_eq!(normalize_timezone_name(Some("  ")), "UTC");
        assert_eq!(normalize_timezone_name(None), "UTC");
        assert_eq!(get_timezone(Some("Mars/Olympus")), Tz::UTC);
        assert_eq!(get_timezone(Some("Europe/Berlin")), Tz::Europe__Berlin);
    }

    #[test]
    fn formats_in_target_zone() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        assert_eq!(format_in_timezone(dt, get_timezone(None)), "2024-01-15 14:30 UTC");
        assert_eq!(
            format_in_timezone(dt, get_timezone(Some("America/New_York"))),
            "2024-01-15 09:30 EST"
        );
    }
}
