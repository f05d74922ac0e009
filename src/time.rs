use crate::error::{self, CacheError};
use crate::Result;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Deref, Sub};

#[derive(Clone, Copy)]
enum TimeUnit {
    Seconds = 1,
    Minutes = 60,
    Hours = 3600,
    Days = 86400,
}

impl TimeUnit {
    fn from_suffix(suffix: char) -> Result<TimeUnit> {
        let unit = match suffix.to_ascii_lowercase() {
            's' => TimeUnit::Seconds,
            'm' => TimeUnit::Minutes,
            'h' => TimeUnit::Hours,
            'd' => TimeUnit::Days,
            other => {
                return Err(error::gen(format!(
                    "unknown unit '{other}', expected one of s, m, h or d"
                )))
            }
        };
        Ok(unit)
    }
}

/// Source of the current time in epoch milliseconds. Injected everywhere
/// freshness is computed so tests can move time around.
pub trait Clock: Send + Sync {
    fn now(&self) -> Milliseconds;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Milliseconds {
        now_epoch_millis()
    }
}

pub fn now_epoch_millis() -> Milliseconds {
    let now_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    Milliseconds(now_epoch)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seconds(u64);

impl Seconds {
    pub const fn new(seconds: u64) -> Self {
        Seconds(seconds)
    }

    pub fn to_millis(self) -> Milliseconds {
        Milliseconds(self.0.saturating_mul(1000))
    }

    pub fn to_duration(self) -> std::time::Duration {
        std::time::Duration::from_secs(self.0)
    }
}

impl Sub<Seconds> for Seconds {
    type Output = Seconds;

    fn sub(self, rhs: Seconds) -> Self::Output {
        Seconds(self.0.saturating_sub(rhs.0))
    }
}

impl Add<Seconds> for Seconds {
    type Output = Seconds;

    fn add(self, rhs: Seconds) -> Self::Output {
        Seconds(self.0 + rhs.0)
    }
}

impl Deref for Seconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Seconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Epoch or elapsed milliseconds. Cache and expiry dates are stored with this
/// resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Milliseconds(u64);

impl Milliseconds {
    pub const fn new(milliseconds: u64) -> Self {
        Milliseconds(milliseconds)
    }

    /// Formats an epoch timestamp in local time. Epoch zero is what an
    /// invalidated entry carries, so it gets spelled out.
    pub fn to_local_date(self) -> String {
        if self.0 == 0 {
            return "invalidated".to_string();
        }
        match Local.timestamp_millis_opt(self.0 as i64).single() {
            Some(date) => format_date(date),
            None => self.0.to_string(),
        }
    }
}

fn format_date(date: DateTime<Local>) -> String {
    date.format("%d %b %y at %H:%M:%S%.3f").to_string()
}

impl Sub<Milliseconds> for Milliseconds {
    type Output = Milliseconds;

    fn sub(self, rhs: Milliseconds) -> Self::Output {
        Milliseconds(self.0.saturating_sub(rhs.0))
    }
}

impl Add<Milliseconds> for Milliseconds {
    type Output = Milliseconds;

    fn add(self, rhs: Milliseconds) -> Self::Output {
        Milliseconds(self.0.saturating_add(rhs.0))
    }
}

impl Deref for Milliseconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Milliseconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses durations such as `90`, `30s`, `5 min`, `2hours` or `1d`. Only
/// the first letter after the amount picks the unit, the rest of the word is
/// ignored. A bare number is taken as seconds.
fn parse_duration(input: &str) -> Result<Seconds> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (amount, rest) = input.split_at(split);
    let amount: u64 = if amount.is_empty() {
        0
    } else {
        amount
            .parse()
            .map_err(|err| error::gen(format!("invalid amount {amount}: {err}")))?
    };
    let multiplier = match rest.trim_start().chars().next() {
        Some(suffix) => TimeUnit::from_suffix(suffix)? as u64,
        None => 1,
    };
    Ok(Seconds(amount.saturating_mul(multiplier)))
}

impl TryFrom<&str> for Seconds {
    type Error = CacheError;

    fn try_from(input: &str) -> std::result::Result<Self, Self::Error> {
        parse_duration(input).map_err(|err| {
            CacheError::TimeConversionError(format!("Could not parse duration {input}: {err}"))
        })
    }
}
