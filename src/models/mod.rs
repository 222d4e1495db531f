// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod roundup;
pub mod sync;
pub mod user;

pub use activity::{Activity, NewActivity};
pub use roundup::{
    ActivitySplitEntry, CalendarDayEntry, MonthlyInsights, MonthlyRoundup, MostActiveDay,
    MostActiveTimeOfDay,
};
pub use sync::SyncSummary;
pub use user::{Athlete, AthleteTokens, NewAthlete};
