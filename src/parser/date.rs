//! `Date` header parsing.
//!
//! Values are split into whitespace tokens and read field by field, so a
//! zone such as `CEST` is matched as a whole word rather than by suffix.
//! Stricter and stranger layouts fall through to chrono and then to
//! `mail-parser`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tracing::debug;

use crate::parser::address::strip_comments;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Zone abbreviations seen in real mail, with their offset in minutes.
const NAMED_ZONES: &[(&str, i32)] = &[
    ("UT", 0),
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("EST", -5 * 60),
    ("EDT", -4 * 60),
    ("CST", -6 * 60),
    ("CDT", -5 * 60),
    ("MST", -7 * 60),
    ("MDT", -6 * 60),
    ("PST", -8 * 60),
    ("PDT", -7 * 60),
    ("WET", 0),
    ("WEST", 60),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 2 * 60),
    ("MET", 60),
    ("MEST", 2 * 60),
    ("EET", 2 * 60),
    ("EEST", 3 * 60),
    ("MSK", 3 * 60),
    ("IST", 5 * 60 + 30),
    ("JST", 9 * 60),
    ("KST", 9 * 60),
    ("AEST", 10 * 60),
    ("AEDT", 11 * 60),
];

/// Numeric layouts produced by scripts and some webmail exports.
const NUMERIC_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a `Date` header value into UTC.
///
/// Returns `None` when nothing matches; the caller treats that as an
/// undefined date.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_comments(value);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let parsed = parse_fields(cleaned)
        .or_else(|| {
            DateTime::parse_from_rfc2822(cleaned)
                .or_else(|_| DateTime::parse_from_rfc3339(cleaned))
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|| parse_numeric(cleaned))
        .or_else(|| mail_parser_date(cleaned));

    if parsed.is_none() {
        debug!(date = cleaned, "Unrecognized date");
    }
    parsed
}

/// Read `[weekday] day month year time [zone]` and its common variants:
/// `16-JUL-2025 time [zone]` and the asctime `month day time year [zone]`.
fn parse_fields(value: &str) -> Option<DateTime<Utc>> {
    let tokens: Vec<&str> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    let tokens = match tokens.split_first() {
        Some((first, rest)) if is_weekday(first) => rest,
        _ => &tokens[..],
    };

    let (date, time, zone) = match tokens {
        [date, time, zone @ ..] if date.contains('-') => {
            let mut fields = date.split('-');
            let (day, month, year) = (fields.next()?, fields.next()?, fields.next()?);
            if fields.next().is_some() {
                return None;
            }
            (calendar_date(day, month, year)?, *time, zone)
        }
        [month, day, time, year, zone @ ..] if month_number(month).is_some() => {
            (calendar_date(day, month, year)?, *time, zone)
        }
        [day, month, year, time, zone @ ..] => (calendar_date(day, month, year)?, *time, zone),
        _ => return None,
    };

    let offset = match zone {
        [] => FixedOffset::east_opt(0)?,
        [zone] => zone_offset(zone)?,
        _ => return None,
    };
    offset
        .from_local_datetime(&date.and_time(clock_time(time)?))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_weekday(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    token.chars().all(|c| c.is_ascii_alphabetic())
        && WEEKDAYS.iter().any(|day| lower.starts_with(day))
}

/// `"Jul"`, `"JUL"` and `"July"` all give 7.
fn month_number(token: &str) -> Option<u32> {
    if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let lower = token.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| lower.starts_with(month))
        .map(|i| i as u32 + 1)
}

fn calendar_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    let month = month_number(month)?;
    let year = match (year.len(), year.parse::<i32>().ok()?) {
        // Two and three digit years per RFC 5322 obs-year.
        (2, y) if y < 50 => 2000 + y,
        (2 | 3, y) => 1900 + y,
        (_, y) => y,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `HH:MM` or `HH:MM:SS`; a leap second is clamped to :59.
fn clock_time(token: &str) -> Option<NaiveTime> {
    let mut fields = token.split(':').map(|f| f.parse::<u32>().ok());
    let hour = fields.next()??;
    let minute = fields.next()??;
    let second = fields.next().unwrap_or(Some(0))?;
    if fields.next().is_some() {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, second.min(59))
}

/// `+hhmm`, `-hh:mm` or a zone name from [`NAMED_ZONES`].
fn zone_offset(token: &str) -> Option<FixedOffset> {
    let compact = token.replace(':', "");
    let minutes = match compact.as_bytes() {
        [sign @ (b'+' | b'-'), digits @ ..]
            if digits.len() == 4 && digits.iter().all(u8::is_ascii_digit) =>
        {
            let hours: i32 = compact[1..3].parse().ok()?;
            let mins: i32 = compact[3..5].parse().ok()?;
            let total = hours * 60 + mins;
            if *sign == b'-' {
                -total
            } else {
                total
            }
        }
        _ => NAMED_ZONES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|&(_, minutes)| minutes)?,
    };
    FixedOffset::east_opt(minutes * 60)
}

fn parse_numeric(value: &str) -> Option<DateTime<Utc>> {
    NUMERIC_LAYOUTS.iter().find_map(|layout| {
        DateTime::parse_from_str(value, layout)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(value, layout).map(|ndt| ndt.and_utc()))
            .ok()
    })
}

/// Last resort: let `mail-parser` read the value as a `Date` header.
fn mail_parser_date(value: &str) -> Option<DateTime<Utc>> {
    let wrapped = format!("Date: {value}\r\n\r\n");
    let message = mail_parser::MessageParser::default().parse(wrapped.as_bytes())?;
    DateTime::from_timestamp(message.date()?.to_timestamp(), 0)
}
