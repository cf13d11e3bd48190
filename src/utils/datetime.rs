//! XMLTV timestamp handling.
//!
//! XMLTV stamps look like `20231215120000 +0000`; the offset part is
//! optional in the wild and some feeds drop the seconds.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

/// Parse an XMLTV datetime (`YYYYMMDDHHMMSS ±ZZZZ`) into UTC.
pub fn parse_xmltv_datetime(value: &str) -> Option<DateTime<Utc>> {
    let mut parts = value.split_whitespace();
    let stamp = parts.next()?;
    let offset = parts.next();

    if stamp.len() < 12 || !stamp.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let year: i32 = stamp[0..4].parse().ok()?;
    let month: u32 = stamp[4..6].parse().ok()?;
    let day: u32 = stamp[6..8].parse().ok()?;
    let hour: u32 = stamp[8..10].parse().ok()?;
    let minute: u32 = stamp[10..12].parse().ok()?;
    let second: u32 = if stamp.len() >= 14 {
        stamp[12..14].parse().ok()?
    } else {
        0
    };

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

    match offset.and_then(parse_offset) {
        Some(offset) => Some(offset.from_local_datetime(&naive).single()?.with_timezone(&Utc)),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// Parse a `±HHMM` offset.
fn parse_offset(value: &str) -> Option<FixedOffset> {
    if value.len() != 5 {
        return None;
    }
    let sign = match value.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = value[1..3].parse().ok()?;
    let minutes: i32 = value[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Format a UTC timestamp as an XMLTV stamp with an explicit zero offset.
pub fn format_xmltv_datetime(value: DateTime<Utc>) -> String {
    value.format("%Y%m%d%H%M%S +0000").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_stamp_with_offset() {
        let parsed = parse_xmltv_datetime("20231215120000 +0000").unwrap();
        assert_eq!(parsed.hour(), 12);

        let shifted = parse_xmltv_datetime("20231215120000 -0500").unwrap();
        assert_eq!(shifted.hour(), 17);
    }

    #[test]
    fn parses_stamp_without_offset_as_utc() {
        let parsed = parse_xmltv_datetime("20231215093000").unwrap();
        assert_eq!(parsed.hour(), 9);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn parses_short_stamp_without_seconds() {
        let parsed = parse_xmltv_datetime("202312150930 +0000").unwrap();
        assert_eq!(parsed.second(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_xmltv_datetime("not a time").is_none());
        assert!(parse_xmltv_datetime("2023").is_none());
    }

    #[test]
    fn round_trips_through_format() {
        let original = parse_xmltv_datetime("20231215120000 +0000").unwrap();
        let formatted = format_xmltv_datetime(original);
        assert_eq!(parse_xmltv_datetime(&formatted).unwrap(), original);
    }
}
