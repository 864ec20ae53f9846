//! Calendar values and their textual storage formats.
//!
//! Storage text follows the formats databases hand back for DATE, TIME,
//! TIMESTAMP and INTERVAL columns:
//!
//! - date: `YYYY-MM-DD`
//! - time: `HH:MM:SS[.ffffff]` (the fraction is padded or truncated to
//!   microseconds)
//! - datetime: `YYYY-MM-DD HH:MM:SS[.ffffff]`
//! - interval: `N days HH:MM:SS[.ffffff]` or `N day, HH:MM:SS`; month and
//!   year units have no fixed length and are rejected.
//!
//! Dates are proleptic Gregorian. Epoch conversions use the integer
//! civil-from-days algorithm (H. Hinnant, "chrono-Compatible Low-Level Date
//! Algorithms").

use std::fmt;

use fsorm_error::{OrmError, Result};
use serde::{Deserialize, Serialize};

const MICROS_PER_SECOND: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;
const MICROS_PER_DAY: i64 = SECONDS_PER_DAY * MICROS_PER_SECOND;

// ── Civil day arithmetic ──────────────────────────────────────────────────

const fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

const fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since 1970-01-01 for `(year, month, day)`.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// `(year, month, day)` for a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn parse_int<T: std::str::FromStr>(part: &str, kind: &'static str, input: &str) -> Result<T> {
    let part = part.trim();
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OrmError::parse(kind, format!("unknown {kind} format: {input:?}")));
    }
    part.parse::<T>()
        .map_err(|_| OrmError::parse(kind, format!("unknown {kind} format: {input:?}")))
}

/// Parse `SS[.fraction]` into `(seconds, microseconds)`.
fn parse_seconds(part: &str, kind: &'static str, input: &str) -> Result<(u32, u32)> {
    let (whole, frac) = match part.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (part, None),
    };
    let seconds = parse_int::<u32>(whole, kind, input)?;
    let micros = match frac {
        None => 0,
        Some(frac) => {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(OrmError::parse(kind, format!("unknown {kind} format: {input:?}")));
            }
            let mut digits: String = frac.chars().take(6).collect();
            while digits.len() < 6 {
                digits.push('0');
            }
            parse_int::<u32>(&digits, kind, input)?
        }
    };
    Ok((seconds, micros))
}

// ---------------------------------------------------------------------------
// Date
// ---------------------------------------------------------------------------

/// A calendar date.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Date {
    year: i32,
    month: u32,
    day: u32,
}

impl Date {
    /// Create a date, validating month and day.
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        if !(1..=9999).contains(&year) {
            return Err(OrmError::parse("date", format!("year {year} is out of range")));
        }
        if !(1..=12).contains(&month) {
            return Err(OrmError::parse("date", format!("month {month} is out of range")));
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(OrmError::parse("date", "day is out of range for month"));
        }
        Ok(Self { year, month, day })
    }

    /// Parse `YYYY-MM-DD`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.trim().split('-');
        let (Some(y), Some(m), Some(d), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(OrmError::parse("date", format!("unknown date format: {input:?}")));
        };
        Self::new(
            parse_int(y, "date", input)?,
            parse_int(m, "date", input)?,
            parse_int(d, "date", input)?,
        )
    }

    /// The date `days` after 1970-01-01 (negative for earlier dates).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_days_since_epoch(days: i64) -> Result<Self> {
        let (y, m, d) = civil_from_days(days);
        let year = i32::try_from(y)
            .map_err(|_| OrmError::parse("date", format!("year {y} is out of range")))?;
        Self::new(year, m as u32, d as u32)
    }

    /// Days between 1970-01-01 and this date.
    pub fn days_since_epoch(self) -> i64 {
        days_from_civil(i64::from(self.year), i64::from(self.month), i64::from(self.day))
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    pub const fn day(self) -> u32 {
        self.day
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A time of day with microsecond precision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Time {
    hour: u32,
    minute: u32,
    second: u32,
    microsecond: u32,
}

impl Time {
    /// Midnight.
    pub const MIDNIGHT: Self = Self {
        hour: 0,
        minute: 0,
        second: 0,
        microsecond: 0,
    };

    /// Create a time of day, validating every component.
    pub fn new(hour: u32, minute: u32, second: u32, microsecond: u32) -> Result<Self> {
        if hour > 23 || minute > 59 || second > 59 || microsecond > 999_999 {
            return Err(OrmError::parse(
                "time",
                format!("{hour:02}:{minute:02}:{second:02}.{microsecond:06} is out of range"),
            ));
        }
        Ok(Self {
            hour,
            minute,
            second,
            microsecond,
        })
    }

    /// Parse `HH:MM:SS[.ffffff]`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.trim().split(':');
        let (Some(h), Some(m), Some(s), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(OrmError::parse("time", format!("unknown time format: {input:?}")));
        };
        let (second, micros) = parse_seconds(s, "time", input)?;
        Self::new(
            parse_int(h, "time", input)?,
            parse_int(m, "time", input)?,
            second,
            micros,
        )
    }

    /// Microseconds since midnight.
    pub fn micros_since_midnight(self) -> i64 {
        (i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second))
            * MICROS_PER_SECOND
            + i64::from(self.microsecond)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_micros_since_midnight(micros: i64) -> Self {
        let secs = micros / MICROS_PER_SECOND;
        Self {
            hour: (secs / 3600) as u32,
            minute: ((secs % 3600) / 60) as u32,
            second: (secs % 60) as u32,
            microsecond: (micros % MICROS_PER_SECOND) as u32,
        }
    }

    pub const fn hour(self) -> u32 {
        self.hour
    }

    pub const fn minute(self) -> u32 {
        self.minute
    }

    pub const fn second(self) -> u32 {
        self.second
    }

    pub const fn microsecond(self) -> u32 {
        self.microsecond
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        if self.microsecond != 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DateTime
// ---------------------------------------------------------------------------

/// A naive (zone-less, UTC by convention) timestamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DateTime {
    date: Date,
    time: Time,
}

impl DateTime {
    pub const fn new(date: Date, time: Time) -> Self {
        Self { date, time }
    }

    /// Parse `YYYY-MM-DD HH:MM:SS[.ffffff]`.
    pub fn parse(input: &str) -> Result<Self> {
        let Some((date, time)) = input.trim().split_once(' ') else {
            return Err(OrmError::parse(
                "datetime",
                format!("unknown date/time format: {input:?}"),
            ));
        };
        Ok(Self {
            date: Date::parse(date)?,
            time: Time::parse(time)?,
        })
    }

    /// Convert seconds since the Unix epoch (UTC).
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_unix_seconds(seconds: f64) -> Result<Self> {
        let micros = (seconds * 1_000_000.0).round();
        if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
            return Err(OrmError::parse(
                "datetime",
                format!("timestamp {seconds} is out of range"),
            ));
        }
        Self::from_unix_micros(micros as i64)
    }

    /// Convert microseconds since the Unix epoch (UTC).
    pub fn from_unix_micros(micros: i64) -> Result<Self> {
        let days = micros.div_euclid(MICROS_PER_DAY);
        let rem = micros.rem_euclid(MICROS_PER_DAY);
        Ok(Self {
            date: Date::from_days_since_epoch(days)?,
            time: Time::from_micros_since_midnight(rem),
        })
    }

    /// Microseconds since the Unix epoch.
    pub fn unix_micros(self) -> i64 {
        self.date.days_since_epoch() * MICROS_PER_DAY + self.time.micros_since_midnight()
    }

    pub const fn date(self) -> Date {
        self.date
    }

    pub const fn time(self) -> Time {
        self.time
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

// ---------------------------------------------------------------------------
// TimeDelta
// ---------------------------------------------------------------------------

/// A signed duration with microsecond precision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeDelta {
    micros: i64,
}

impl TimeDelta {
    pub const ZERO: Self = Self { micros: 0 };

    pub const fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Build a delta from components; fails on overflow.
    pub fn new(days: i64, hours: i64, minutes: i64, seconds: i64, micros: i64) -> Result<Self> {
        let overflow = || OrmError::parse("interval", "interval is out of range");
        let secs = hours
            .checked_mul(3600)
            .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
            .and_then(|hm| hm.checked_add(seconds))
            .ok_or_else(overflow)?;
        let total = days
            .checked_mul(MICROS_PER_DAY)
            .and_then(|d| secs.checked_mul(MICROS_PER_SECOND).and_then(|s| d.checked_add(s)))
            .and_then(|ds| ds.checked_add(micros))
            .ok_or_else(overflow)?;
        Ok(Self { micros: total })
    }

    /// Parse interval text such as `42 days 12:34:56.78` or `1 day, 12:34:56`.
    pub fn parse(input: &str) -> Result<Self> {
        let unknown = || OrmError::parse("interval", format!("unknown interval format: {input:?}"));
        let mut days: i64 = 0;
        let mut clock: i64 = 0;
        let mut saw_component = false;
        let mut tokens = input.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            if token.contains(':') {
                clock = parse_clock(token, input)?;
                saw_component = true;
                continue;
            }
            let amount: i64 = token.parse().map_err(|_| unknown())?;
            let unit = tokens.next().ok_or_else(unknown)?;
            match unit.trim_end_matches(',') {
                "day" | "days" => {
                    days = days.checked_add(amount).ok_or_else(unknown)?;
                    saw_component = true;
                }
                other => {
                    return Err(OrmError::parse(
                        "interval",
                        format!("unsupported interval unit {other:?} in {input:?}"),
                    ));
                }
            }
        }
        if !saw_component {
            return Err(unknown());
        }
        Self::new(days, 0, 0, 0, clock)
    }

    pub const fn total_micros(self) -> i64 {
        self.micros
    }

    /// Whole days, rounded towards negative infinity.
    pub const fn days(self) -> i64 {
        self.micros.div_euclid(MICROS_PER_DAY)
    }
}

/// Parse `[+-]H:MM[:SS[.ffffff]]` into signed microseconds.
fn parse_clock(token: &str, input: &str) -> Result<i64> {
    let (sign, body) = match token.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, token.strip_prefix('+').unwrap_or(token)),
    };
    let parts: Vec<&str> = body.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => {
            return Err(OrmError::parse(
                "interval",
                format!("unknown interval format: {input:?}"),
            ));
        }
    };
    let hours = parse_int::<i64>(h, "interval", input)?;
    let minutes = parse_int::<i64>(m, "interval", input)?;
    let (seconds, micros) = parse_seconds(s, "interval", input)?;
    let delta = TimeDelta::new(0, hours, minutes, i64::from(seconds), i64::from(micros))?;
    Ok(sign * delta.micros)
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.days();
        let rem = self.micros.rem_euclid(MICROS_PER_DAY);
        if days != 0 {
            let unit = if days.abs() == 1 { "day" } else { "days" };
            write!(f, "{days} {unit}, ")?;
        }
        let secs = rem / MICROS_PER_SECOND;
        write!(f, "{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)?;
        let frac = rem % MICROS_PER_SECOND;
        if frac != 0 {
            write!(f, ".{frac:06}")?;
        }
        Ok(())
    }
}
