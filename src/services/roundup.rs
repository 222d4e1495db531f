// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Monthly roundup aggregation.
//!
//! One range query per request, then a pure fold over the month's
//! activities. Calendar days and hours use the activity's local wall clock
//! when Strava reported one, and UTC otherwise.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use crate::db::SqliteDb;
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivitySplitEntry, CalendarDayEntry, MonthlyInsights, MonthlyRoundup,
    MostActiveDay, MostActiveTimeOfDay,
};

const HOURS_PER_DAY: usize = 24;

/// A calendar month, parsed from `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthToken {
    year: i32,
    month: u32,
}

impl MonthToken {
    /// Years 1 through 9999; month 1 through 12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    /// The month containing `instant` in UTC.
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    /// The current UTC month.
    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// First day of the following month.
    fn next_first_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
    }

    /// Inclusive UTC start of the month.
    pub fn start(&self) -> DateTime<Utc> {
        self.first_day().and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Exclusive UTC end of the month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next_first_day().and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Civil day count (28-31).
    pub fn days_in_month(&self) -> u32 {
        (self.next_first_day() - self.first_day()).num_days() as u32
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl FromStr for MonthToken {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::InvalidMonthFormat(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year = year.trim().parse::<i32>().map_err(|_| invalid())?;
        let month = month.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl fmt::Display for MonthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Builds monthly roundups from stored activities.
#[derive(Clone)]
pub struct RoundupService {
    db: SqliteDb,
}

impl RoundupService {
    pub fn new(db: SqliteDb) -> Self {
        Self { db }
    }

    /// Roundup for `month` (`YYYY-MM`), or the current UTC month.
    pub fn build(&self, athlete_id: i64, month: Option<&str>) -> Result<MonthlyRoundup> {
        let month = match month {
            Some(raw) => raw.parse::<MonthToken>()?,
            None => MonthToken::current(),
        };

        if !self.db.athlete_exists(athlete_id)? {
            return Err(AppError::OwnerNotFound(athlete_id));
        }

        let activities = self
            .db
            .get_activities_in_range(athlete_id, month.start(), month.end())?;

        tracing::debug!(
            athlete_id,
            month = %month,
            activities = activities.len(),
            "Building monthly roundup"
        );

        Ok(summarize_month(athlete_id, month, &activities))
    }
}

// ─── Aggregation ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    activities: u32,
    distance_km: f64,
    moving_time_seconds: i64,
    elevation_gain_m: f64,
}

impl Totals {
    fn add(self, activity: &Activity) -> Self {
        let fields = &activity.fields;
        Self {
            activities: self.activities + 1,
            distance_km: self.distance_km + fields.distance_km.unwrap_or(0.0),
            moving_time_seconds: self.moving_time_seconds + fields.moving_time_seconds.unwrap_or(0),
            elevation_gain_m: self.elevation_gain_m + fields.total_elevation_gain.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct HourBucket {
    activities: u32,
    moving_time_seconds: i64,
}

/// Calendar date the athlete experienced the activity on.
fn local_date(activity: &Activity) -> NaiveDate {
    match activity.fields.start_date_local {
        Some(local) => local.date(),
        None => activity.fields.start_date.date_naive(),
    }
}

/// Hour of day the athlete experienced the activity at.
fn local_hour(activity: &Activity) -> u32 {
    match activity.fields.start_date_local {
        Some(local) => local.hour(),
        None => activity.fields.start_date.hour(),
    }
}

/// Aggregate one month of activities.
///
/// `activities` should be exactly the athlete's activities whose UTC start
/// falls inside `month`; totals count all of them even when the local date
/// lands in a neighboring month.
pub fn summarize_month(athlete_id: i64, month: MonthToken, activities: &[Activity]) -> MonthlyRoundup {
    let totals = activities.iter().fold(Totals::default(), Totals::add);
    let calendar_days = calendar_days(month, activities);
    let hours = hour_buckets(activities);

    let active_days: Vec<&CalendarDayEntry> =
        calendar_days.iter().filter(|day| day.is_active).collect();
    let active_day_count = active_days.len() as u32;

    let insights = MonthlyInsights {
        most_active_day: most_active_day(&active_days),
        most_active_time_of_day: most_active_hour(&hours),
        average_activity_time_seconds: (active_day_count > 0)
            .then(|| totals.moving_time_seconds / i64::from(active_day_count)),
        weekly_streak_weeks: weekly_streak(active_days.iter().map(|day| day.date)),
    };

    let start = month.start();
    MonthlyRoundup {
        athlete_id,
        month: month.to_string(),
        month_name: start.format("%B").to_string(),
        month_label: start.format("%B %Y").to_string(),
        period_start: start,
        period_end: month.end(),
        total_active_days: active_day_count,
        total_activities: totals.activities,
        total_distance_km: round_to(totals.distance_km, 3),
        total_moving_time_seconds: totals.moving_time_seconds,
        total_elevation_gain_m: round_to(totals.elevation_gain_m, 3),
        activity_split: activity_split(activities, totals.activities),
        calendar_days,
        insights,
    }
}

/// Activity-type mix, most common first. Ties keep first-seen order.
fn activity_split(activities: &[Activity], total: u32) -> Vec<ActivitySplitEntry> {
    let (order, counts) = activities.iter().fold(
        (Vec::<&str>::new(), HashMap::<&str, u32>::new()),
        |(mut order, mut counts), activity| {
            let kind = activity.activity_type_or_other();
            let count = counts.entry(kind).or_insert(0);
            if *count == 0 {
                order.push(kind);
            }
            *count += 1;
            (order, counts)
        },
    );

    let mut entries: Vec<ActivitySplitEntry> = order
        .into_iter()
        .map(|kind| {
            let count = counts.get(kind).copied().unwrap_or(0);
            let percentage = if total > 0 {
                f64::from(count) / f64::from(total) * 100.0
            } else {
                0.0
            };
            ActivitySplitEntry {
                activity_type: kind.to_string(),
                count,
                percentage: round_to(percentage, 1),
            }
        })
        .collect();

    // Stable, so equal counts stay in first-seen order.
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

/// One entry per civil day of the month.
fn calendar_days(month: MonthToken, activities: &[Activity]) -> Vec<CalendarDayEntry> {
    let days = month.days_in_month() as usize;
    let empty = CalendarDayEntry {
        day: 0,
        date: month.first_day(),
        is_active: false,
        total_activities: 0,
        total_distance_km: 0.0,
        total_moving_time_seconds: 0,
    };

    let buckets = activities
        .iter()
        .filter_map(|activity| {
            let date = local_date(activity);
            month.contains(date).then_some((date.day0() as usize, activity))
        })
        .fold(vec![empty; days], |mut buckets, (idx, activity)| {
            let bucket = &mut buckets[idx];
            bucket.total_activities += 1;
            bucket.total_distance_km += activity.fields.distance_km.unwrap_or(0.0);
            bucket.total_moving_time_seconds += activity.fields.moving_time_seconds.unwrap_or(0);
            buckets
        });

    buckets
        .into_iter()
        .enumerate()
        .map(|(idx, bucket)| CalendarDayEntry {
            day: idx as u32 + 1,
            date: month.first_day() + Duration::days(idx as i64),
            is_active: bucket.total_activities > 0,
            total_distance_km: round_to(bucket.total_distance_km, 3),
            ..bucket
        })
        .collect()
}

/// Per-hour counts over every activity in the UTC window.
fn hour_buckets(activities: &[Activity]) -> [HourBucket; HOURS_PER_DAY] {
    activities
        .iter()
        .fold([HourBucket::default(); HOURS_PER_DAY], |mut hours, activity| {
            let bucket = &mut hours[local_hour(activity) as usize % HOURS_PER_DAY];
            bucket.activities += 1;
            bucket.moving_time_seconds += activity.fields.moving_time_seconds.unwrap_or(0);
            hours
        })
}

/// Busiest day by moving time, then distance, then count. Earliest day wins ties.
fn most_active_day(active_days: &[&CalendarDayEntry]) -> Option<MostActiveDay> {
    fn rank(a: &CalendarDayEntry, b: &CalendarDayEntry) -> Ordering {
        a.total_moving_time_seconds
            .cmp(&b.total_moving_time_seconds)
            .then(a.total_distance_km.total_cmp(&b.total_distance_km))
            .then(a.total_activities.cmp(&b.total_activities))
    }

    active_days
        .iter()
        .copied()
        .fold(None::<&CalendarDayEntry>, |best, day| match best {
            Some(current) if rank(day, current) != Ordering::Greater => Some(current),
            _ => Some(day),
        })
        .map(|day| MostActiveDay {
            date: day.date,
            total_activities: day.total_activities,
            total_distance_km: day.total_distance_km,
            total_moving_time_seconds: day.total_moving_time_seconds,
        })
}

/// Busiest hour by count, then moving time. Lowest hour wins ties.
fn most_active_hour(hours: &[HourBucket; HOURS_PER_DAY]) -> Option<MostActiveTimeOfDay> {
    hours
        .iter()
        .enumerate()
        .filter(|(_, bucket)| bucket.activities > 0)
        .fold(None::<(usize, &HourBucket)>, |best, (hour, bucket)| match best {
            Some((_, current))
                if (bucket.activities, bucket.moving_time_seconds)
                    <= (current.activities, current.moving_time_seconds) =>
            {
                best
            }
            _ => Some((hour, bucket)),
        })
        .map(|(hour, bucket)| MostActiveTimeOfDay {
            hour: hour as u32,
            total_activities: bucket.activities,
            total_moving_time_seconds: bucket.moving_time_seconds,
        })
}

/// Monday of the ISO week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Consecutive active weeks counted back from the latest active week.
fn weekly_streak(active_dates: impl Iterator<Item = NaiveDate>) -> u32 {
    let weeks: BTreeSet<NaiveDate> = active_dates.map(week_start).collect();

    let mut newest_first = weeks.iter().rev();
    let Some(&latest) = newest_first.next() else {
        return 0;
    };

    let mut streak = 1;
    let mut previous = latest;
    for &week in newest_first {
        if previous - week != Duration::days(7) {
            break;
        }
        streak += 1;
        previous = week;
    }
    streak
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewActivity;
    use chrono::{FixedOffset, TimeZone};

    fn activity_at(start: DateTime<Utc>, offset_hours: i32) -> Activity {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        Activity {
            id: 0,
            athlete_id: 1,
            fields: NewActivity {
                strava_activity_id: start.timestamp(),
                name: None,
                activity_type: Some("Run".to_string()),
                start_date: start,
                start_date_local: Some(start.with_timezone(&offset).naive_local()),
                timezone: None,
                distance_km: Some(5.0),
                moving_time_seconds: Some(1800),
                elapsed_time_seconds: None,
                total_elevation_gain: None,
                summary_polyline: None,
                primary_photo_url: None,
                raw_payload: serde_json::Value::Null,
            },
            created_at: start,
            updated_at: start,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_token_parsing() {
        let token: MonthToken = "2025-01".parse().unwrap();
        assert_eq!((token.year(), token.month()), (2025, 1));
        assert_eq!(token.to_string(), "2025-01");
        assert_eq!("2024-2".parse::<MonthToken>().unwrap().to_string(), "2024-02");

        for bad in ["2025/01", "2025-13", "2025-00", "2025", "", "abcd-01", "2025-01-01", "-01"] {
            let err = bad.parse::<MonthToken>().unwrap_err();
            assert!(
                matches!(err, AppError::InvalidMonthFormat(_)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_month_bounds_roll_over_december() {
        let token: MonthToken = "2024-12".parse().unwrap();
        assert_eq!(token.start(), Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(token.end(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_days_in_month() {
        let days = |s: &str| s.parse::<MonthToken>().unwrap().days_in_month();
        assert_eq!(days("2025-01"), 31);
        assert_eq!(days("2025-02"), 28);
        assert_eq!(days("2024-02"), 29);
        assert_eq!(days("1900-02"), 28);
        assert_eq!(days("2000-02"), 29);
        assert_eq!(days("2025-04"), 30);
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2025-01-12 is a Sunday, 2025-01-13 a Monday.
        assert_eq!(week_start(date(2025, 1, 12)), date(2025, 1, 6));
        assert_eq!(week_start(date(2025, 1, 13)), date(2025, 1, 13));
    }

    #[test]
    fn test_weekly_streak_counts_back_from_latest_week() {
        let dates = [date(2025, 1, 6), date(2025, 1, 14), date(2025, 1, 22), date(2025, 1, 29)];
        assert_eq!(weekly_streak(dates.into_iter()), 4);

        // Week of Jan 13 missing: only Jan 20 and Jan 27 weeks chain.
        let gapped = [date(2025, 1, 6), date(2025, 1, 22), date(2025, 1, 29)];
        assert_eq!(weekly_streak(gapped.into_iter()), 2);

        assert_eq!(weekly_streak(std::iter::empty()), 0);
        // Several days in one week count once.
        assert_eq!(weekly_streak([date(2025, 1, 6), date(2025, 1, 7)].into_iter()), 1);
    }

    #[test]
    fn test_negative_offset_moves_day_and_hour() {
        let start = Utc.with_ymd_and_hms(2025, 1, 11, 5, 30, 0).unwrap();
        let roundup = summarize_month(1, "2025-01".parse().unwrap(), &[activity_at(start, -8)]);

        assert!(roundup.calendar_days[9].is_active);
        assert_eq!(roundup.calendar_days[9].day, 10);
        assert!(!roundup.calendar_days[10].is_active);
        let hour = roundup.insights.most_active_time_of_day.unwrap();
        assert_eq!(hour.hour, 21);
    }

    #[test]
    fn test_falls_back_to_utc_without_local_start() {
        let start = Utc.with_ymd_and_hms(2025, 1, 11, 5, 30, 0).unwrap();
        let mut activity = activity_at(start, -8);
        activity.fields.start_date_local = None;

        let roundup = summarize_month(1, "2025-01".parse().unwrap(), &[activity]);
        assert!(roundup.calendar_days[10].is_active);
        assert_eq!(roundup.insights.most_active_time_of_day.unwrap().hour, 5);
    }

    #[test]
    fn test_most_active_day_tie_goes_to_earliest_day() {
        let first = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 3, 18, 10, 0, 0).unwrap();
        let roundup = summarize_month(
            1,
            "2025-03".parse().unwrap(),
            &[activity_at(second, 0), activity_at(first, 0)],
        );
        assert_eq!(roundup.insights.most_active_day.unwrap().date, date(2025, 3, 4));
    }

    #[test]
    fn test_most_active_day_uses_distance_then_count() {
        let a = activity_at(Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap(), 0);
        let mut b = activity_at(Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap(), 0);
        b.fields.distance_km = Some(5.5);

        let roundup = summarize_month(1, "2025-03".parse().unwrap(), &[a, b]);
        assert_eq!(roundup.insights.most_active_day.unwrap().date, date(2025, 3, 5));
    }

    #[test]
    fn test_most_active_hour_tie_goes_to_lowest_hour() {
        let late = activity_at(Utc.with_ymd_and_hms(2025, 3, 4, 18, 0, 0).unwrap(), 0);
        let early = activity_at(Utc.with_ymd_and_hms(2025, 3, 5, 7, 0, 0).unwrap(), 0);
        let roundup = summarize_month(1, "2025-03".parse().unwrap(), &[late, early]);
        assert_eq!(roundup.insights.most_active_time_of_day.unwrap().hour, 7);
    }

    #[test]
    fn test_empty_month() {
        let roundup = summarize_month(1, "2025-02".parse().unwrap(), &[]);

        assert_eq!(roundup.calendar_days.len(), 28);
        assert_eq!(roundup.total_activities, 0);
        assert_eq!(roundup.total_active_days, 0);
        assert!(roundup.activity_split.is_empty());
        assert_eq!(roundup.insights.most_active_day, None);
        assert_eq!(roundup.insights.most_active_time_of_day, None);
        assert_eq!(roundup.insights.average_activity_time_seconds, None);
        assert_eq!(roundup.insights.weekly_streak_weeks, 0);
        assert_eq!(roundup.month_label, "February 2025");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(62.500000000001, 3), 62.5);
        assert_eq!(round_to(33.3333, 1), 33.3);
        assert_eq!(round_to(66.6666, 1), 66.7);
    }
}
