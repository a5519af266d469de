//! Publish-date normalization
//!
//! Feeds carry free-form date strings. [`normalize`] walks [`LAYOUTS`] in
//! order and returns the first layout that consumes the whole string. Order
//! matters: several layouts are prefix-ambiguous with each other.
//!
//! chrono's parsers are looser than the layouts (one-digit days, `+00:00`
//! offsets, a lowercase `t` separator), so each layout also carries a shape
//! the input must fit before chrono sees it. In a shape `9` is an ASCII
//! digit, `A` an ASCII letter, `±` a sign, and a trailing `*` hands the rest
//! of the string to the layout's parser. Anything else is literal.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// A recognized date layout
pub struct Layout {
    pub name: &'static str,
    pub shape: &'static str,
    pub parse: fn(&str) -> Option<DateTime<FixedOffset>>,
}

/// Priority table, first match wins
pub const LAYOUTS: &[Layout] = &[
    // Wed, 26 Nov 2025 10:28:03 +0000
    Layout { name: "rfc1123z", shape: "AAA, 99 AAA 9999 99:99:99 ±9999", parse: parse_rfc1123z },
    // Wed, 26 Nov 2025 10:28:03 GMT
    Layout { name: "rfc1123", shape: "AAA, 99 AAA 9999 99:99:99 *", parse: parse_rfc1123 },
    // 26 Nov 25 10:28 +0000
    Layout { name: "rfc822z", shape: "99 AAA 99 99:99 ±9999", parse: parse_rfc822z },
    // 26 Nov 25 10:28 GMT
    Layout { name: "rfc822", shape: "99 AAA 99 99:99 *", parse: parse_rfc822 },
    // 2024-08-28T16:35:03+05:30
    Layout { name: "rfc3339", shape: "9999-99-99T99:99:99*", parse: parse_rfc3339 },
    // 2024-08-28T16:35:03.123456Z
    Layout { name: "rfc3339_fractional", shape: "9999-99-99T99:99:99.*", parse: parse_rfc3339_fractional },
    // 2024-08-28
    Layout { name: "date_only", shape: "9999-99-99", parse: parse_date_only },
    // 26 Nov 2025 10:28:03 +0000
    Layout {
        name: "day_month_year_offset",
        shape: "99 AAA 9999 99:99:99 ±9999",
        parse: parse_day_month_year_offset,
    },
];

const WEEKDAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// RFC 822 zone names with a fixed offset, in seconds east of UTC
const NAMED_ZONES: &[(&str, i32)] = &[
    ("UT", 0),
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
];

/// Raised when no layout matches a date string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported date format: {0:?}")]
pub struct NotParseable(pub String);

/// Convert a feed date string to an absolute UTC instant
pub fn normalize(raw: &str) -> Result<DateTime<Utc>, NotParseable> {
    matching_layout(raw)
        .map(|(_, dt)| dt.with_timezone(&Utc))
        .ok_or_else(|| NotParseable(raw.to_string()))
}

/// Name of the layout that would be used for `raw`, if any
pub fn matching_layout(raw: &str) -> Option<(&'static str, DateTime<FixedOffset>)> {
    LAYOUTS
        .iter()
        .filter(|layout| fits_shape(raw, layout.shape))
        .find_map(|layout| (layout.parse)(raw).map(|dt| (layout.name, dt)))
}

/// Whether `s` has exactly the form described by `shape`
fn fits_shape(s: &str, shape: &str) -> bool {
    let mut input = s.bytes();
    for token in shape.chars() {
        if token == '*' {
            return input.len() > 0;
        }
        let Some(b) = input.next() else {
            return false;
        };
        let fits = match token {
            '9' => b.is_ascii_digit(),
            'A' => b.is_ascii_alphabetic(),
            '±' => b == b'+' || b == b'-',
            literal => literal.is_ascii() && b == literal as u8,
        };
        if !fits {
            return false;
        }
    }
    input.len() == 0
}

fn parse_rfc1123z(s: &str) -> Option<DateTime<FixedOffset>> {
    let rest = strip_weekday(s)?;
    DateTime::parse_from_str(rest, "%d %b %Y %H:%M:%S %z").ok()
}

fn parse_rfc1123(s: &str) -> Option<DateTime<FixedOffset>> {
    let rest = strip_weekday(s)?;
    with_named_zone(rest, "%d %b %Y %H:%M:%S")
}

fn parse_rfc822z(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, "%d %b %y %H:%M %z").ok()
}

fn parse_rfc822(s: &str) -> Option<DateTime<FixedOffset>> {
    with_named_zone(s, "%d %b %y %H:%M")
}

fn parse_rfc3339(s: &str) -> Option<DateTime<FixedOffset>> {
    if !is_rfc3339_offset(s.get(19..)?) {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok()
}

fn parse_rfc3339_fractional(s: &str) -> Option<DateTime<FixedOffset>> {
    let rest = s.get(20..)?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || !is_rfc3339_offset(&rest[digits..]) {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok()
}

fn parse_date_only(s: &str) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let utc = FixedOffset::east_opt(0)?;
    date.and_hms_opt(0, 0, 0)?
        .and_local_timezone(utc)
        .single()
}

fn parse_day_month_year_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, "%d %b %Y %H:%M:%S %z").ok()
}

/// `"Wed, rest"` -> `"rest"`; the weekday is checked for syntax only
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(", ")?;
    WEEKDAYS.contains(&day).then_some(rest)
}

/// Parse `"<datetime> <ZONE>"` where ZONE is an alphabetic abbreviation
fn with_named_zone(s: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    let (datetime, zone) = s.rsplit_once(' ')?;
    let offset = FixedOffset::east_opt(zone_offset(zone)?)?;
    NaiveDateTime::parse_from_str(datetime, format)
        .ok()?
        .and_local_timezone(offset)
        .single()
}

/// Unknown abbreviations are read as UTC
fn zone_offset(zone: &str) -> Option<i32> {
    if let Some((_, secs)) = NAMED_ZONES.iter().find(|(name, _)| *name == zone) {
        return Some(*secs);
    }
    let plausible = (2..=5).contains(&zone.len()) && zone.bytes().all(|b| b.is_ascii_uppercase());
    plausible.then_some(0)
}

/// `Z` or `±hh:mm`, nothing looser
fn is_rfc3339_offset(s: &str) -> bool {
    s == "Z" || fits_shape(s, "±99:99")
}
