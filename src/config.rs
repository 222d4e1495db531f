// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use chrono::{DateTime, TimeZone, Utc};
use std::env;
use std::str::FromStr;

use crate::time_utils::parse_utc_lenient;

/// Strava's largest allowed `per_page`.
pub const MAX_PAGE_SIZE: u32 = 200;

/// What to do when the per-activity photo detail fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoBackfillPolicy {
    /// Propagate the failure and abort the whole sync.
    #[default]
    Abort,
    /// Log the failure and store the activity without a photo.
    Skip,
}

impl FromStr for PhotoBackfillPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(ConfigError::Invalid("PHOTO_BACKFILL", other.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Strava REST API base URL
    pub strava_api_base: String,
    /// Strava OAuth token endpoint
    pub strava_token_url: String,
    /// SQLite database file
    pub database_path: String,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Earliest instant a sync will ever reach back to
    pub sync_baseline: DateTime<Utc>,
    /// Activities requested per Strava page
    pub sync_page_size: u32,
    /// Failure handling for photo detail fetches
    pub photo_backfill: PhotoBackfillPolicy,
}

impl Config {
    /// Config for tests; never talks to a real Strava endpoint.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            strava_api_base: "http://127.0.0.1:9/api/v3".to_string(),
            strava_token_url: "http://127.0.0.1:9/oauth/token".to_string(),
            database_path: ":memory:".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8000,
            sync_baseline: default_baseline(),
            sync_page_size: MAX_PAGE_SIZE,
            photo_backfill: PhotoBackfillPolicy::Abort,
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let sync_baseline = match env::var("SYNC_BASELINE") {
            Ok(raw) => parse_utc_lenient(raw.trim())
                .ok_or(ConfigError::Invalid("SYNC_BASELINE", raw))?,
            Err(_) => default_baseline(),
        };

        let sync_page_size = match env::var("SYNC_PAGE_SIZE") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| (1..=MAX_PAGE_SIZE).contains(n))
                .ok_or(ConfigError::Invalid("SYNC_PAGE_SIZE", raw))?,
            Err(_) => MAX_PAGE_SIZE,
        };

        let photo_backfill = match env::var("PHOTO_BACKFILL") {
            Ok(raw) => raw.parse()?,
            Err(_) => PhotoBackfillPolicy::default(),
        };

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            strava_api_base: env::var("STRAVA_API_BASE")
                .unwrap_or_else(|_| "https://www.strava.com/api/v3".to_string()),
            strava_token_url: env::var("STRAVA_TOKEN_URL")
                .unwrap_or_else(|_| "https://www.strava.com/oauth/token".to_string()),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "roundup.db".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            sync_baseline,
            sync_page_size,
            photo_backfill,
        })
    }
}

fn default_baseline() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
