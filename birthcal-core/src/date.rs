//! Birth date parsing and occurrence arithmetic.
//!
//! vCard `BDAY` values come in several textual layouts, some of which omit
//! the year (`--MM-DD`). Year-less dates are stored in [`LEAP_YEAR_SENTINEL`]
//! so that February 29 survives parsing.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone};

use crate::constants::LEAP_YEAR_SENTINEL;
use crate::error::{BirthcalError, BirthcalResult};

/// A resolved birth date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDate {
    /// Calendar date. The year is [`LEAP_YEAR_SENTINEL`] when unknown.
    pub date: NaiveDate,
    pub year_known: bool,
}

impl BirthDate {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Birthday projected into `year`, see [`normalize_date`].
    pub fn in_year(&self, year: i32) -> NaiveDate {
        normalize_date(year, self.month(), self.day())
    }
}

/// Parse a vCard `BDAY` value.
///
/// Year-bearing layouts are tried first, then the truncated vCard forms.
/// The first layout that matches wins.
pub fn parse_birth_date(value: &str) -> BirthcalResult<BirthDate> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BirthcalError::DateParse(value.to_string()));
    }

    let with_year = parse_with_year(value);
    if let Some(date) = with_year {
        return Ok(BirthDate {
            date,
            year_known: true,
        });
    }

    if let Some(date) = parse_without_year(value) {
        return Ok(BirthDate {
            date,
            year_known: false,
        });
    }

    Err(BirthcalError::DateParse(value.to_string()))
}

fn parse_with_year(value: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d);
    }
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(value, "%Y%m%d") {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ") {
        return Some(dt.date());
    }
    None
}

fn parse_without_year(value: &str) -> Option<NaiveDate> {
    let rest = value.strip_prefix("--")?;

    // --MM-DD
    if rest.len() == 5 && rest.as_bytes()[2] == b'-' {
        let candidate = format!("{LEAP_YEAR_SENTINEL}-{rest}");
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, "%Y-%m-%d") {
            return Some(d);
        }
    }

    // --MMDD
    if rest.len() == 4 && rest.bytes().all(|b| b.is_ascii_digit()) {
        let candidate = format!("{LEAP_YEAR_SENTINEL}{rest}");
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, "%Y%m%d") {
            return Some(d);
        }
    }

    None
}

/// Build `year-month-day`, letting out-of-range days overflow into the next
/// month. February 29 in a non-leap year becomes March 1.
pub fn normalize_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN);
    first
        .checked_add_days(Days::new(u64::from(day.saturating_sub(1))))
        .unwrap_or(first)
}

/// Next occurrence of a birthday on or after the start of today in `now`'s zone.
///
/// A birthday falling today counts as upcoming. Returns the occurrence date
/// and the age reached on it (0 when the birth year is unknown).
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, birth: &BirthDate) -> (NaiveDate, i32) {
    let today = now.date_naive();

    let mut candidate = birth.in_year(today.year());
    if candidate < today {
        candidate = birth.in_year(today.year() + 1);
    }

    let age = if birth.year_known {
        candidate.year() - birth.year()
    } else {
        0
    };

    (candidate, age)
}
