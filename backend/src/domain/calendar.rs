//! Calendar arithmetic for cache units and quota periods.
//!
//! All stored day keys are midnight UTC. Quota months are measured in a
//! configurable fixed reference offset.

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Serialize;

use crate::domain::Error;

/// Midnight UTC at the start of `day`.
#[must_use]
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// First instant of the calendar month containing `now`, as seen from
/// `offset`.
///
/// # Examples
/// ```
/// use chrono::{FixedOffset, TimeZone, Utc};
/// use solarboard::domain::calendar::month_start_in;
///
/// let now = Utc.with_ymd_and_hms(2026, 4, 30, 23, 30, 0).unwrap();
/// let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
/// // 01:30 on 1 May locally, so the local month already rolled over.
/// assert_eq!(
///     month_start_in(now, plus_two),
///     Utc.with_ymd_and_hms(2026, 4, 30, 22, 0, 0).unwrap()
/// );
/// ```
#[must_use]
pub fn month_start_in(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_day = now.with_timezone(&offset).date_naive();
    let local_midnight = YearMonth::of(local_day).first_day().and_time(NaiveTime::MIN);
    let utc_naive = local_midnight - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    utc_naive.and_utc()
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct YearMonth {
    first: NaiveDate,
}

impl YearMonth {
    /// The month containing `day`.
    #[must_use]
    pub fn of(day: NaiveDate) -> Self {
        Self {
            first: day - Days::new(u64::from(day.day0())),
        }
    }

    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        self.first
    }

    #[must_use]
    pub fn last_day(self) -> NaiveDate {
        self.next().first - Days::new(1)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            first: self.first + Months::new(1),
        }
    }

    #[must_use]
    pub fn year(self) -> i32 {
        self.first.year()
    }

    #[must_use]
    pub fn month(self) -> u32 {
        self.first.month()
    }

    /// Whether `day` falls inside this month.
    #[must_use]
    pub fn contains(self, day: NaiveDate) -> bool {
        Self::of(day) == self
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// A closed range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Validate `start <= end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if start > end {
            return Err(Error::invalid_request("start date must not be after end date"));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending on `end`, inclusive.
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self, Error> {
        if days == 0 {
            return Err(Error::invalid_request("day count must be positive"));
        }
        Ok(Self::last_days(end, days))
    }

    /// Like [`DateRange::trailing`] for fixed windows; zero is read as one day.
    #[must_use]
    pub fn last_days(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end - Days::new(u64::from(days.saturating_sub(1))),
            end,
        }
    }

    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, inclusive of both ends.
    #[must_use]
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Every day in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |day| *day <= self.end)
    }

    /// Every calendar month touched by the range, in order.
    #[must_use]
    pub fn months(&self) -> Vec<YearMonth> {
        let last = YearMonth::of(self.end);
        let mut months = Vec::new();
        let mut current = YearMonth::of(self.start);
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// The part of `month` inside this range.
    #[must_use]
    pub fn clip_to_month(&self, month: YearMonth) -> Option<Self> {
        let start = self.start.max(month.first_day());
        let end = self.end.min(month.last_day());
        (start <= end).then_some(Self { start, end })
    }

    /// Half-open UTC instant span `[start midnight, day after end midnight)`.
    #[must_use]
    pub fn instant_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (day_start(self.start), day_start(self.end + Days::new(1)))
    }
}

/// Granularity at which cache coverage is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
}

/// One unit of cache coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheUnit {
    Day(NaiveDate),
    Month(YearMonth),
}

impl CacheUnit {
    /// The unit of `granularity` containing `day`.
    #[must_use]
    pub fn containing(granularity: Granularity, day: NaiveDate) -> Self {
        match granularity {
            Granularity::Day => Self::Day(day),
            Granularity::Month => Self::Month(YearMonth::of(day)),
        }
    }

    /// Decompose `range` into units, in order.
    #[must_use]
    pub fn decompose(granularity: Granularity, range: &DateRange) -> Vec<Self> {
        match granularity {
            Granularity::Day => range.days().map(Self::Day).collect(),
            Granularity::Month => range.months().into_iter().map(Self::Month).collect(),
        }
    }

    /// First and last day of the unit.
    #[must_use]
    pub fn bounds(self) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Day(day) => (day, day),
            Self::Month(month) => (month.first_day(), month.last_day()),
        }
    }

    /// The calendar month the unit belongs to.
    #[must_use]
    pub fn month(self) -> YearMonth {
        match self {
            Self::Day(day) => YearMonth::of(day),
            Self::Month(month) => month,
        }
    }
}
