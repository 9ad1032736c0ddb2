use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%d %b %Y", "%b %d, %Y", "%B %d, %Y"];

/// Parses a feed date.
///
/// A bare `YYYY-MM-DD` is built from its components as a local calendar day,
/// so it never shifts across midnight. Everything else goes through the
/// generic formats; zoned timestamps are converted to local time. Returns
/// `None` when nothing matches.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if is_calendar_pattern(value) {
        return parse_calendar_date(value).and_then(|d| d.and_hms_opt(0, 0, 0));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn is_calendar_pattern(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

/// `YYYY-MM-DD` only; `None` for any other shape or an impossible day.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    if !is_calendar_pattern(value) {
        return None;
    }
    let year: i32 = value[0..4].parse().ok()?;
    let month: u32 = value[5..7].parse().ok()?;
    let day: u32 = value[8..10].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Bucket label such as `Jan 2024`.
pub fn month_label(year: i32, month: u32) -> String {
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(d) => d.format("%b %Y").to_string(),
        None => format!("{month:02} {year}"),
    }
}

pub fn month_key(dt: &NaiveDateTime) -> (i32, u32) {
    (dt.year(), dt.month())
}
