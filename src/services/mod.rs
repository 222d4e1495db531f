// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod roundup;
pub mod strava;
pub mod sync;

pub use roundup::{summarize_month, MonthToken, RoundupService};
pub use strava::{RefreshLocks, StravaService, TokenCache};
pub use sync::{compute_cutoff, ActivityFetcher, ActivitySyncer, SyncOptions, UpsertPlan};
