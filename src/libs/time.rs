use std::{cmp::Ordering, fmt, ops::Deref, str::FromStr};

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, CrmResult};

/// Storage format for timestamps. Fixed width, so string order is time order.
pub const YYYYMMDD_HHMMSS: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(YYYYMMDD_HHMMSS).to_string()
}

pub fn parse_time(value: &str) -> CrmResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, YYYYMMDD_HHMMSS)
        .map(|t| t.and_utc())
        .map_err(|e| CrmError::Database(format!("bad timestamp {:?}: {}", value, e)))
}

/// 时间戳
///
/// A UTC instant as rows carry it. Serializes exactly like `DateTime<Utc>`
/// and parses from the storage format, so row types can derive their
/// database decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl Deref for Timestamp {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl PartialEq<DateTime<Utc>> for Timestamp {
    fn eq(&self, other: &DateTime<Utc>) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<DateTime<Utc>> for Timestamp {
    fn partial_cmp(&self, other: &DateTime<Utc>) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl FromStr for Timestamp {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time(s).map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_time(&self.0))
    }
}

/// A (month, year) pair. Targets and recognised revenue are bucketed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        op::ternary!((1..=12).contains(&month) => Some(Self { month, year }); None)
    }

    /// The period `now` falls in, on the UTC calendar.
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self {
            month: now.month(),
            year: now.year(),
        }
    }

    /// First instant of the period.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First instant after the period.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn next(&self) -> Self {
        match self.month {
            12 => Self {
                month: 1,
                year: self.year + 1,
            },
            m => Self {
                month: m + 1,
                year: self.year,
            },
        }
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        *time >= self.start() && *time < self.end()
    }
}

/// `now` minus `days`, the boundary for "recent" activity.
pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}
