// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlete model for storage and API.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Athlete row, including the current Strava credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    /// Local athlete ID
    pub id: i64,
    /// Strava athlete ID
    pub strava_id: i64,
    pub firstname: String,
    pub lastname: String,
    /// Profile picture URL
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing)]
    pub tokens: AthleteTokens,
}

/// Strava OAuth credentials for one athlete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AthleteTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (unix seconds)
    pub expires_at: i64,
}

impl AthleteTokens {
    pub fn is_present(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// Fields needed to register an athlete.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAthlete {
    #[validate(range(min = 1))]
    pub strava_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub firstname: String,
    #[validate(length(min = 1, max = 100))]
    pub lastname: String,
    #[validate(url)]
    pub profile_image_url: Option<String>,
    #[validate(length(min = 1))]
    pub access_token: String,
    #[validate(length(min = 1))]
    pub refresh_token: String,
    pub expires_at: i64,
}
