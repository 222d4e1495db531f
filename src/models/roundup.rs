// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Monthly roundup response shapes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the activity-type breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySplitEntry {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub count: u32,
    /// Share of the month's activities, one decimal
    pub percentage: f64,
}

/// One calendar day of the month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDayEntry {
    pub day: u32,
    pub date: NaiveDate,
    pub is_active: bool,
    pub total_activities: u32,
    pub total_distance_km: f64,
    pub total_moving_time_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostActiveDay {
    pub date: NaiveDate,
    pub total_activities: u32,
    pub total_distance_km: f64,
    pub total_moving_time_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MostActiveTimeOfDay {
    /// Local hour, 0-23
    pub hour: u32,
    pub total_activities: u32,
    pub total_moving_time_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyInsights {
    pub most_active_day: Option<MostActiveDay>,
    pub most_active_time_of_day: Option<MostActiveTimeOfDay>,
    pub average_activity_time_seconds: Option<i64>,
    pub weekly_streak_weeks: u32,
}

/// Calendar-shaped summary of one athlete's month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRoundup {
    pub athlete_id: i64,
    /// "YYYY-MM"
    pub month: String,
    /// "January"
    pub month_name: String,
    /// "January 2025"
    pub month_label: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_active_days: u32,
    pub total_activities: u32,
    pub total_distance_km: f64,
    pub total_moving_time_seconds: i64,
    pub total_elevation_gain_m: f64,
    pub activity_split: Vec<ActivitySplitEntry>,
    pub calendar_days: Vec<CalendarDayEntry>,
    pub insights: MonthlyInsights,
}
