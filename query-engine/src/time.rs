use crate::Error;
use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static RELATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^now(?:([+-])(\d+)([smhdw]))?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 60 * 60,
            TimeUnit::Day => 24 * 60 * 60,
            TimeUnit::Week => 7 * 24 * 60 * 60,
        }
    }

    fn symbol(&self) -> char {
        match self {
            TimeUnit::Second => 's',
            TimeUnit::Minute => 'm',
            TimeUnit::Hour => 'h',
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "s" => Some(TimeUnit::Second),
            "m" => Some(TimeUnit::Minute),
            "h" => Some(TimeUnit::Hour),
            "d" => Some(TimeUnit::Day),
            "w" => Some(TimeUnit::Week),
            _ => None,
        }
    }
}

/// One boundary of a time window in its raw form. Relative points are
/// offsets from the instant they are resolved at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimePoint {
    Relative { amount: i64, unit: TimeUnit },
    Absolute(DateTime<Utc>),
}

impl TimePoint {
    pub fn now() -> Self {
        TimePoint::Relative {
            amount: 0,
            unit: TimeUnit::Second,
        }
    }

    pub fn ago(amount: i64, unit: TimeUnit) -> Self {
        TimePoint::Relative {
            amount: -amount,
            unit,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TimePoint::Relative { .. })
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimePoint::Absolute(t) => *t,
            TimePoint::Relative { amount, unit } => offset(*amount, *unit)
                .and_then(|delta| now.checked_add_signed(delta))
                .unwrap_or(now),
        }
    }
}

fn offset(amount: i64, unit: TimeUnit) -> Option<TimeDelta> {
    amount
        .checked_mul(unit.seconds())
        .and_then(TimeDelta::try_seconds)
}

impl FromStr for TimePoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(captures) = RELATIVE.captures(s) {
            let (Some(sign), Some(amount), Some(unit)) =
                (captures.get(1), captures.get(2), captures.get(3))
            else {
                return Ok(TimePoint::now());
            };

            let unit = TimeUnit::from_symbol(unit.as_str())
                .ok_or_else(|| Error::ParseTime(s.to_string()))?;
            let mut amount: i64 = amount
                .as_str()
                .parse()
                .map_err(|_| Error::ParseTime(s.to_string()))?;
            if sign.as_str() == "-" {
                amount = -amount;
            }
            if offset(amount, unit).is_none() {
                return Err(Error::ParseTime(s.to_string()));
            }

            return Ok(TimePoint::Relative { amount, unit });
        }

        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .map(TimePoint::Absolute)
                .ok_or_else(|| Error::ParseTime(s.to_string()));
        }

        DateTime::parse_from_rfc3339(s)
            .map(|t| TimePoint::Absolute(t.with_timezone(&Utc)))
            .map_err(|_| Error::ParseTime(s.to_string()))
    }
}

impl TryFrom<String> for TimePoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimePoint> for String {
    fn from(point: TimePoint) -> Self {
        point.to_string()
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePoint::Relative { amount: 0, .. } => f.write_str("now"),
            TimePoint::Relative { amount, unit } if *amount < 0 => {
                write!(f, "now-{}{}", amount.unsigned_abs(), unit.symbol())
            }
            TimePoint::Relative { amount, unit } => write!(f, "now+{}{}", amount, unit.symbol()),
            TimePoint::Absolute(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: TimePoint,
    pub to: TimePoint,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            from: TimePoint::ago(5, TimeUnit::Minute),
            to: TimePoint::now(),
        }
    }
}

impl TimeWindow {
    pub fn new(from: TimePoint, to: TimePoint) -> Self {
        Self { from, to }
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, Error> {
        Ok(Self {
            from: from.parse()?,
            to: to.parse()?,
        })
    }

    pub fn is_relative(&self) -> bool {
        self.from.is_relative() || self.to.is_relative()
    }

    /// Absolute bounds at `now`, truncated to whole seconds so that
    /// resolutions within the same second are equal.
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedWindow {
        ResolvedWindow {
            from: self.from.resolve(now).trunc_subsecs(0),
            to: self.to.resolve(now).trunc_subsecs(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ResolvedWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: from.trunc_subsecs(0),
            to: to.trunc_subsecs(0),
        }
    }

    /// Length of the window; inverted windows have zero length.
    pub fn duration(&self) -> TimeDelta {
        (self.to - self.from).max(TimeDelta::zero())
    }

    pub fn from_secs(&self) -> i64 {
        self.from.timestamp()
    }

    pub fn to_secs(&self) -> i64 {
        self.to.timestamp()
    }

    pub fn as_window(&self) -> TimeWindow {
        TimeWindow::new(TimePoint::Absolute(self.from), TimePoint::Absolute(self.to))
    }
}

impl fmt::Display for ResolvedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.to.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}
