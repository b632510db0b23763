use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Wall-clock time as carried on the wire: signed seconds since the Unix
/// epoch plus a nanosecond part.
///
/// Values are kept normalised (`0 <= nsec < 1e9`) so the derived ordering is
/// chronological. Deserialisation normalises too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "WireTimeStamp")]
pub struct TimeStamp {
    pub sec: i64,
    pub nsec: i32,
}

#[derive(Deserialize)]
struct WireTimeStamp {
    sec: i64,
    #[serde(default)]
    nsec: i64,
}

impl From<WireTimeStamp> for TimeStamp {
    fn from(wire: WireTimeStamp) -> Self {
        Self::new(wire.sec, wire.nsec)
    }
}

impl TimeStamp {
    pub const MIN: TimeStamp = TimeStamp { sec: i64::MIN, nsec: 0 };
    pub const MAX: TimeStamp = TimeStamp {
        sec: i64::MAX,
        nsec: (NANOS_PER_SEC - 1) as i32,
    };

    /// Build a timestamp, carrying overflowing or negative nanoseconds into
    /// the seconds field.
    pub fn new(sec: i64, nsec: i64) -> Self {
        let carry = nsec.div_euclid(NANOS_PER_SEC);
        let nsec = nsec.rem_euclid(NANOS_PER_SEC) as i32;
        Self {
            sec: sec.saturating_add(carry),
            nsec,
        }
    }

    pub fn from_secs(sec: i64) -> Self {
        Self { sec, nsec: 0 }
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    /// Seconds as a float, for diagnostics and tolerances.
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 * 1e-9
    }

    pub fn to_datetime(&self) -> Result<DateTime<Utc>, TypesError> {
        Utc.timestamp_opt(self.sec, self.nsec as u32)
            .single()
            .ok_or(TypesError::TimeOutOfRange)
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::new(dt.timestamp(), dt.timestamp_subsec_nanos() as i64)
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// Closed time interval `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: TimeStamp,
    pub end: TimeStamp,
}

impl TimeInterval {
    /// Build an interval; the bounds are swapped if given in reverse order.
    pub fn new(a: TimeStamp, b: TimeStamp) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// The interval covering every representable timestamp.
    pub fn everything() -> Self {
        Self {
            start: TimeStamp::MIN,
            end: TimeStamp::MAX,
        }
    }

    pub fn instant(t: TimeStamp) -> Self {
        Self { start: t, end: t }
    }

    pub fn contains(&self, t: &TimeStamp) -> bool {
        *t >= self.start && *t <= self.end
    }

    /// Smallest interval covering both `self` and `t`.
    pub fn extend(&mut self, t: TimeStamp) {
        if t < self.start {
            self.start = t;
        }
        if t > self.end {
            self.end = t;
        }
    }

    /// Smallest interval covering every timestamp yielded, or `None` when
    /// the iterator is empty.
    pub fn spanning<I: IntoIterator<Item = TimeStamp>>(times: I) -> Option<Self> {
        let mut iter = times.into_iter();
        let first = iter.next()?;
        let mut interval = Self::instant(first);
        for t in iter {
            interval.extend(t);
        }
        Some(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nanoseconds_are_normalised() {
        assert_eq!(TimeStamp::new(1, 1_500_000_000), TimeStamp { sec: 2, nsec: 500_000_000 });
        assert_eq!(TimeStamp::new(1, -1), TimeStamp { sec: 0, nsec: 999_999_999 });
    }

    #[test]
    fn deserialisation_normalises() {
        let t: TimeStamp = serde_json::from_str(r#"{"sec": 1, "nsec": -5}"#).unwrap();
        assert_eq!(t, TimeStamp { sec: 0, nsec: 999_999_995 });
        assert!(t < TimeStamp::from_secs(1));

        let t: TimeStamp = serde_json::from_str(r#"{"sec": 2, "nsec": 3000000000}"#).unwrap();
        assert_eq!(t, TimeStamp::from_secs(5));
    }

    #[test]
    fn chrono_roundtrip() {
        let t = TimeStamp::new(1_700_000_000, 123_456_789);
        let dt = t.to_datetime().unwrap();
        assert_eq!(TimeStamp::from(dt), t);
    }

    #[test]
    fn interval_bounds_are_ordered() {
        let a = TimeStamp::from_secs(10);
        let b = TimeStamp::from_secs(5);
        let i = TimeInterval::new(a, b);
        assert_eq!(i.start, b);
        assert!(i.contains(&TimeStamp::from_secs(7)));
        assert!(!i.contains(&TimeStamp::from_secs(11)));
    }

    #[test]
    fn spanning_interval() {
        let i = TimeInterval::spanning([3, 9, 1].map(TimeStamp::from_secs)).unwrap();
        assert_eq!(i.start, TimeStamp::from_secs(1));
        assert_eq!(i.end, TimeStamp::from_secs(9));
        assert!(TimeInterval::spanning(Vec::new()).is_none());
    }

    proptest! {
        #[test]
        fn ordering_matches_float_seconds(
            s1 in -1_000_000i64..1_000_000, n1 in -3_000_000_000i64..3_000_000_000,
            s2 in -1_000_000i64..1_000_000, n2 in -3_000_000_000i64..3_000_000_000,
        ) {
            let a = TimeStamp::new(s1, n1);
            let b = TimeStamp::new(s2, n2);
            prop_assert!((0..1_000_000_000).contains(&a.nsec));
            let total_a = s1 as i128 * 1_000_000_000 + n1 as i128;
            let total_b = s2 as i128 * 1_000_000_000 + n2 as i128;
            prop_assert_eq!(a.cmp(&b), total_a.cmp(&total_b));
        }
    }
}
