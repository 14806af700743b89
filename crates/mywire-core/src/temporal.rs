//! Date and time values as MySQL transmits them.
//!
//! These are calendar field tuples, not instants: MySQL DATE, DATETIME and
//! TIMESTAMP columns carry no zone information on the wire, and the all-zero
//! value (`0000-00-00`) is a legal column value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A calendar date (MYSQL_TYPE_DATE).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Date {
    pub year: i16,
    pub month: u8,
    pub day: u8,
}

/// A calendar date and wall-clock time (MYSQL_TYPE_DATETIME).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Datetime {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Sub-second part; only microsecond precision survives the wire.
    pub nanosecond: u32,
}

/// A TIMESTAMP column value.
///
/// Same fields as [`Datetime`], but bound and decoded as MYSQL_TYPE_TIMESTAMP.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub Datetime);

/// A signed duration (MYSQL_TYPE_TIME), stored as nanoseconds.
///
/// MySQL TIME ranges over roughly ±839 hours and is not a time of day.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Time(i64);

impl Date {
    pub const fn new(year: i16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// The `0000-00-00` date.
    pub const fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

impl Datetime {
    pub const fn new(year: i16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            nanosecond: 0,
        }
    }

    pub const fn with_nanosecond(mut self, nanosecond: u32) -> Self {
        self.nanosecond = nanosecond;
        self
    }

    /// The `0000-00-00 00:00:00` datetime.
    pub const fn is_zero(&self) -> bool {
        self.date().is_zero() && !self.has_time()
    }

    /// True when any of hour, minute, second or nanosecond is set.
    pub const fn has_time(&self) -> bool {
        self.hour != 0 || self.minute != 0 || self.second != 0 || self.nanosecond != 0
    }

    pub const fn date(&self) -> Date {
        Date::new(self.year, self.month, self.day)
    }

    /// Microsecond part as carried by the binary protocol.
    pub const fn microsecond(&self) -> u32 {
        self.nanosecond / 1000
    }

    /// Convert seconds since the Unix epoch to a UTC datetime.
    pub fn from_unix_seconds(secs: i64) -> Self {
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);
        let (year, month, day) = days_to_ymd(days);
        Self::new(
            year as i16,
            month as u8,
            day as u8,
            (rem / 3600) as u8,
            ((rem % 3600) / 60) as u8,
            (rem % 60) as u8,
        )
    }
}

impl From<Date> for Datetime {
    fn from(d: Date) -> Self {
        Self::new(d.year, d.month, d.day, 0, 0, 0)
    }
}

impl Timestamp {
    pub const fn datetime(&self) -> Datetime {
        self.0
    }
}

impl From<Datetime> for Timestamp {
    fn from(dt: Datetime) -> Self {
        Timestamp(dt)
    }
}

impl Time {
    pub const fn from_nanos(nanos: i64) -> Self {
        Time(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Time(micros * 1000)
    }

    /// Build a non-negative duration from hours, minutes and seconds.
    pub const fn from_hms(hours: u32, minutes: u8, seconds: u8) -> Self {
        let secs = hours as i64 * 3600 + minutes as i64 * 60 + seconds as i64;
        Time(secs * NANOS_PER_SEC)
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn neg(self) -> Self {
        Time(-self.0)
    }

    /// Split into (negative, days, hours, minutes, seconds, microseconds).
    ///
    /// Sub-microsecond precision is truncated toward zero.
    pub const fn components(&self) -> (bool, u32, u8, u8, u8, u32) {
        let abs = self.0.unsigned_abs();
        let micros = ((abs / 1000) % 1_000_000) as u32;
        let total_secs = abs / NANOS_PER_SEC as u64;
        let seconds = (total_secs % 60) as u8;
        let minutes = ((total_secs / 60) % 60) as u8;
        let total_hours = total_secs / 3600;
        let hours = (total_hours % 24) as u8;
        let days = (total_hours / 24) as u32;
        (self.0 < 0, days, hours, minutes, seconds, micros)
    }

    /// Inverse of [`Time::components`].
    ///
    /// `None` if `micros` is not below one second or the total does not fit.
    pub fn from_components(
        negative: bool,
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        micros: u32,
    ) -> Option<Self> {
        if micros >= 1_000_000 {
            return None;
        }
        let secs = i64::from(days)
            .checked_mul(24)?
            .checked_add(i64::from(hours))?
            .checked_mul(3600)?
            .checked_add(i64::from(minutes) * 60 + i64::from(seconds))?;
        let nanos = secs
            .checked_mul(NANOS_PER_SEC)?
            .checked_add(i64::from(micros) * 1000)?;
        Some(Time(if negative { -nanos } else { nanos }))
    }
}

/// Convert days since 1970-01-01 to (year, month, day).
///
/// Howard Hinnant's civil_from_days.
pub fn days_to_ymd(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date(),
            self.hour,
            self.minute,
            self.second
        )?;
        if self.nanosecond != 0 {
            write!(f, ".{:06}", self.microsecond())?;
        }
        Ok(())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, days, hours, minutes, seconds, micros) = self.components();
        let total_hours = u64::from(days) * 24 + u64::from(hours);
        let sign = if negative { "-" } else { "" };
        write!(f, "{sign}{total_hours:02}:{minutes:02}:{seconds:02}")?;
        if micros != 0 {
            write!(f, ".{micros:06}")?;
        }
        Ok(())
    }
}

fn parse_error(kind: &str, input: &str) -> Error {
    Error::Config(ConfigError {
        message: format!("invalid {kind} literal: '{input}'"),
        source: None,
    })
}

fn parse_field<T: FromStr>(part: Option<&str>, kind: &str, input: &str) -> Result<T, Error> {
    part.filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| parse_error(kind, input))
}

/// Parse up to nine fractional digits into nanoseconds.
fn parse_fraction(frac: &str, kind: &str, input: &str) -> Result<u32, Error> {
    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_error(kind, input));
    }
    let digits: u32 = frac.parse().map_err(|_| parse_error(kind, input))?;
    Ok(digits * 10u32.pow(9 - frac.len() as u32))
}

impl FromStr for Date {
    type Err = Error;

    /// Parse `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        let date = Date::new(
            parse_field(parts.next(), "date", s)?,
            parse_field(parts.next(), "date", s)?,
            parse_field(parts.next(), "date", s)?,
        );
        if parts.next().is_some() {
            return Err(parse_error("date", s));
        }
        Ok(date)
    }
}

impl FromStr for Datetime {
    type Err = Error;

    /// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD HH:MM:SS.ffffff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (date_part, time_part) = match trimmed.split_once([' ', 'T']) {
            Some((d, t)) => (d, Some(t)),
            None => (trimmed, None),
        };
        let date = date_part
            .parse::<Date>()
            .map_err(|_| parse_error("datetime", s))?;
        let mut dt = Datetime::from(date);
        if let Some(time) = time_part {
            let (hms, frac) = match time.split_once('.') {
                Some((hms, frac)) => (hms, Some(frac)),
                None => (time, None),
            };
            let mut fields = hms.split(':');
            dt.hour = parse_field(fields.next(), "datetime", s)?;
            dt.minute = parse_field(fields.next(), "datetime", s)?;
            dt.second = parse_field(fields.next(), "datetime", s)?;
            if fields.next().is_some() {
                return Err(parse_error("datetime", s));
            }
            if let Some(frac) = frac {
                dt.nanosecond = parse_fraction(frac, "datetime", s)?;
            }
        }
        Ok(dt)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Datetime>().map(Timestamp)
    }
}

impl FromStr for Time {
    type Err = Error;

    /// Parse `[-]H:MM:SS[.ffffff]`; hours may exceed 24.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (hms, frac) = match body.split_once('.') {
            Some((hms, frac)) => (hms, Some(frac)),
            None => (body, None),
        };
        let mut fields = hms.split(':');
        let hours: i64 = parse_field(fields.next(), "time", s)?;
        let minutes: i64 = parse_field(fields.next(), "time", s)?;
        let seconds: i64 = parse_field(fields.next(), "time", s)?;
        if fields.next().is_some() || minutes > 59 || seconds > 59 {
            return Err(parse_error("time", s));
        }
        let nanos = match frac {
            Some(frac) => i64::from(parse_fraction(frac, "time", s)?),
            None => 0,
        };
        let total = (hours * 3600 + minutes * 60 + seconds) * NANOS_PER_SEC + nanos;
        Ok(Time(if negative { -total } else { total }))
    }
}
