// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Result of one sync pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Remote payloads processed
    pub fetched: u32,
    pub created: u32,
    pub updated: u32,
    /// Latest `start_date` among processed activities
    pub latest_activity: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}
