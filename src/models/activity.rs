// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava activity model for storage and API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored activity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Local surrogate key
    pub id: i64,
    /// Owning athlete (local id)
    pub athlete_id: i64,
    #[serde(flatten)]
    pub fields: NewActivity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized activity fields, replaced wholesale on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    /// Strava activity ID (unique per athlete)
    pub strava_activity_id: i64,
    /// Activity name/title
    pub name: Option<String>,
    /// Activity type (Run, Ride, Hike, etc.)
    pub activity_type: Option<String>,
    /// Start instant
    pub start_date: DateTime<Utc>,
    /// Wall-clock start at the activity location
    pub start_date_local: Option<NaiveDateTime>,
    /// Timezone label as reported by Strava
    pub timezone: Option<String>,
    pub distance_km: Option<f64>,
    pub moving_time_seconds: Option<i64>,
    pub elapsed_time_seconds: Option<i64>,
    /// Elevation gain in meters
    pub total_elevation_gain: Option<f64>,
    pub summary_polyline: Option<String>,
    pub primary_photo_url: Option<String>,
    /// Raw Strava payload, kept for re-derivation
    #[serde(skip_serializing)]
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl Activity {
    pub fn activity_type_or_other(&self) -> &str {
        self.fields.activity_type.as_deref().unwrap_or("Other")
    }
}

impl NewActivity {
    /// Photo count advertised in the raw payload (0 if absent).
    pub fn advertised_photo_count(&self) -> u64 {
        self.raw_payload
            .get("photos")
            .and_then(|p| p.get("count"))
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }

    /// Whether a detail fetch could supply a missing primary photo.
    pub fn needs_photo_backfill(&self) -> bool {
        self.primary_photo_url.is_none() && self.advertised_photo_count() > 0
    }
}
