use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

/// A PostgreSQL `interval`, kept as its three independent wire components.
///
/// Months and days are not normalized into microseconds since their length
/// depends on the calendar the interval is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.microseconds == 0
    }
}

impl From<(i32, i32, i64)> for Interval {
    fn from((months, days, microseconds): (i32, i32, i64)) -> Self {
        Self::new(months, days, microseconds)
    }
}

impl From<Interval> for (i32, i32, i64) {
    fn from(interval: Interval) -> Self {
        (interval.months, interval.days, interval.microseconds)
    }
}

impl PartialEq<(i32, i32, i64)> for Interval {
    fn eq(&self, other: &(i32, i32, i64)) -> bool {
        (self.months, self.days, self.microseconds) == *other
    }
}

impl PartialEq<Interval> for (i32, i32, i64) {
    fn eq(&self, other: &Interval) -> bool {
        other == self
    }
}

/// Renders the way `psql` shows intervals, e.g. `1 year 2 mons 3 days 04:05:06.5`.
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            parts.push(plural(years as i64, "year", "years"));
        }
        if months != 0 {
            parts.push(plural(months as i64, "mon", "mons"));
        }
        if self.days != 0 {
            parts.push(plural(self.days as i64, "day", "days"));
        }
        if self.microseconds != 0 || parts.is_empty() {
            let sign = if self.microseconds < 0 { "-" } else { "" };
            let micros = self.microseconds.unsigned_abs() as i64;
            let hours = micros / MICROS_PER_HOUR;
            let minutes = (micros % MICROS_PER_HOUR) / MICROS_PER_MINUTE;
            let seconds = (micros % MICROS_PER_MINUTE) / MICROS_PER_SECOND;
            let fraction = micros % MICROS_PER_SECOND;
            let mut clock = format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds);
            if fraction != 0 {
                let digits = format!("{:06}", fraction);
                clock.push('.');
                clock.push_str(digits.trim_end_matches('0'));
            }
            parts.push(clock);
        }
        write!(f, "{}", parts.join(" "))
    }
}

fn plural(n: i64, one: &str, many: &str) -> String {
    if n.abs() == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

impl ToSql for Interval {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        out.put_i64(self.microseconds);
        out.put_i32(self.days);
        out.put_i32(self.months);
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() != 16 {
            return Err(format!("invalid interval payload of {} bytes", raw.len()).into());
        }
        let microseconds = i64::from_be_bytes(raw[0..8].try_into()?);
        let days = i32::from_be_bytes(raw[8..12].try_into()?);
        let months = i32::from_be_bytes(raw[12..16].try_into()?);
        Ok(Interval::new(months, days, microseconds))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}
