//! Display formats for submission dates and times
//!
//! New records are stamped as `D/M/YYYY` and `h:mm:ss am/pm`. Older stores
//! hold a mix of shapes written by earlier versions of the service
//! (zero-padded dates, uppercase meridiem, bare 24-hour clock), and the
//! `normalize_*` functions bring those onto the display format.

use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DMY_DATE: Regex = Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})$").unwrap();
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").unwrap();
    static ref CANONICAL_TIME: Regex =
        Regex::new(r"^([1-9]|1[0-2]):[0-5]\d:[0-5]\d (am|pm)$").unwrap();
    static ref MERIDIEM_TIME: Regex =
        Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?\s*([AaPp])\.?\s*[Mm]\.?$").unwrap();
    static ref TWENTY_FOUR_HOUR_TIME: Regex =
        Regex::new(r"^(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?$").unwrap();
}

/// Format a local timestamp as `D/M/YYYY` (no leading zeros)
pub fn display_date(at: &NaiveDateTime) -> String {
    at.format("%-d/%-m/%Y").to_string()
}

/// Format a local timestamp as `h:mm:ss am/pm`
///
/// The hour has no leading zero, minutes and seconds are zero-padded and
/// the meridiem is lowercase.
pub fn display_time(at: &NaiveDateTime) -> String {
    at.format("%-I:%M:%S %P").to_string()
}

/// Rewrite a stored date string as `D/M/YYYY`
///
/// Accepts `DD/MM/YYYY` (also with `-` or `.` separators) and ISO
/// `YYYY-MM-DD` with an optional time part. Anything else, including the
/// empty string, comes back unchanged.
///
/// # Examples
/// ```
/// use feedback_ledger::timefmt::normalize_date;
///
/// assert_eq!(normalize_date("08/09/2024"), "8/9/2024");
/// assert_eq!(normalize_date("2024-09-08"), "8/9/2024");
/// assert_eq!(normalize_date("sometime"), "sometime");
/// ```
pub fn normalize_date(value: &str) -> String {
    let trimmed = value.trim();

    if let Some(caps) = DMY_DATE.captures(trimmed) {
        if let (Ok(day), Ok(month)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
            return format!("{}/{}/{}", day, month, &caps[3]);
        }
    }

    if let Some(caps) = ISO_DATE.captures(trimmed) {
        if let (Ok(month), Ok(day)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) {
            return format!("{}/{}/{}", day, month, &caps[1]);
        }
    }

    value.to_string()
}

/// Rewrite a stored time string as `h:mm:ss am/pm`
///
/// Three shapes are recognised:
/// - already canonical, returned as is
/// - a meridiem in any case, with or without a zero-padded hour
/// - bare 24-hour `HH:MM[:SS]`, converted to the 12-hour clock
///
/// In the 24-hour shape the minutes are re-rendered as a plain number, so
/// `13:05:00` becomes `1:5:00 pm`. Stores written by earlier releases
/// already contain rows in that exact form and de-duplication relies on
/// the two agreeing.
///
/// # Examples
/// ```
/// use feedback_ledger::timefmt::normalize_time;
///
/// assert_eq!(normalize_time("08:05:01 AM"), "8:05:01 am");
/// assert_eq!(normalize_time("13:05:00"), "1:5:00 pm");
/// ```
pub fn normalize_time(value: &str) -> String {
    let trimmed = value.trim();

    if CANONICAL_TIME.is_match(trimmed) {
        return trimmed.to_string();
    }

    if let Some(caps) = MERIDIEM_TIME.captures(trimmed) {
        if let Ok(hour) = caps[1].parse::<u32>() {
            let seconds = caps.get(3).map_or("00", |m| m.as_str());
            let meridiem = if caps[4].eq_ignore_ascii_case("a") { "am" } else { "pm" };
            return format!("{}:{}:{} {}", hour, &caps[2], seconds, meridiem);
        }
    }

    if let Some(caps) = TWENTY_FOUR_HOUR_TIME.captures(trimmed) {
        if let (Ok(hour), Ok(minute)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
            if hour < 24 && minute < 60 {
                let seconds = caps.get(3).map_or("00", |m| m.as_str());
                let (hour12, meridiem) = match hour {
                    0 => (12, "am"),
                    12 => (12, "pm"),
                    h if h > 12 => (h - 12, "pm"),
                    h => (h, "am"),
                };
                return format!("{}:{}:{} {}", hour12, minute, seconds, meridiem);
            }
        }
    }

    value.to_string()
}
