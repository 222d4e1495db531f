// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for fetching activities.
//!
//! Handles:
//! - Paginated activity listing and single-activity detail fetches
//! - Token refresh when expired (and once more on a 401)
//! - Normalizing raw payloads into [`NewActivity`]

use crate::config::Config;
use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::{Athlete, AthleteTokens, NewActivity};
use crate::services::sync::ActivityFetcher;
use crate::time_utils::{parse_utc_lenient, parse_wall_clock};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Preferred primary photo sizes, best first.
const PHOTO_SIZE_KEYS: [&str; 3] = ["600", "1000", "default"];

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(
        client_id: String,
        client_secret: String,
        base_url: String,
        token_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url,
            client_id,
            client_secret,
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(&self, access_token: &str, activity_id: i64) -> Result<Value, AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);
        self.get_json(&url, access_token, &[]).await
    }

    /// List the athlete's activities started after `after` (paginated).
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64, // Unix timestamp
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, AppError> {
        let url = format!("{}/athlete/activities", self.base_url);
        let query = [
            ("after", after.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];

        match self.get_json::<Value>(&url, access_token, &query).await? {
            Value::Array(items) => Ok(items),
            _ => Err(AppError::RemoteServiceFailure(
                "Unexpected response type for Strava activities".to_string(),
            )),
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::AuthenticationFailure(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token refresh failed");
            return Err(AppError::AuthenticationFailure(format!(
                "Failed to refresh Strava token: HTTP {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            AppError::AuthenticationFailure(format!("Failed to parse token response: {}", e))
        })
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::RemoteServiceFailure(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Strava rate limit hit (429)");
                return Err(AppError::RemoteServiceFailure(
                    "Strava rate limit exceeded".to_string(),
                ));
            }

            // Unauthorized - token may be expired or revoked
            if status.as_u16() == 401 {
                return Err(AppError::AuthenticationFailure(format!(
                    "Strava rejected the access token: {}",
                    body
                )));
            }

            return Err(AppError::RemoteServiceFailure(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::RemoteServiceFailure(format!("JSON parse error: {}", e)))
    }
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    /// Strava may rotate the refresh token; absent means keep the old one.
    pub refresh_token: Option<String>,
    pub expires_at: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload normalization
// ─────────────────────────────────────────────────────────────────────────────

/// The subset of a Strava activity payload that gets normalized.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivityPayload {
    pub id: i64,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub sport_type: Option<String>,
    pub start_date: String,
    pub start_date_local: Option<String>,
    pub timezone: Option<String>,
    /// Meters
    pub distance: Option<f64>,
    pub moving_time: Option<i64>,
    pub elapsed_time: Option<i64>,
    pub total_elevation_gain: Option<f64>,
    pub map: Option<StravaMap>,
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaMap {
    pub summary_polyline: Option<String>,
}

/// Photo metadata attached to an activity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaPhotos {
    pub count: Option<u64>,
    pub primary: Option<StravaPrimaryPhoto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaPrimaryPhoto {
    pub urls: Option<HashMap<String, Option<String>>>,
}

impl StravaPhotos {
    /// Best available primary photo URL.
    pub fn primary_url(&self) -> Option<String> {
        let urls = self.primary.as_ref()?.urls.as_ref()?;
        PHOTO_SIZE_KEYS.iter().find_map(|key| {
            urls.get(*key)
                .cloned()
                .flatten()
                .filter(|url| !url.is_empty())
        })
    }
}

/// Pull the primary photo URL out of a raw payload, if it carries one.
pub fn extract_primary_photo(payload: &Value) -> Option<String> {
    let photos = payload.get("photos")?;
    serde_json::from_value::<StravaPhotos>(photos.clone())
        .ok()?
        .primary_url()
}

/// Convert a raw Strava payload into the stored activity shape.
///
/// Distances are converted to kilometers and missing metrics stay `None`.
/// The raw payload is kept verbatim.
pub fn normalize_activity(raw: Value) -> Result<NewActivity, AppError> {
    let payload: StravaActivityPayload = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::RemoteServiceFailure(format!("Malformed activity payload: {}", e)))?;

    let start_date = parse_utc_lenient(&payload.start_date).ok_or_else(|| {
        AppError::RemoteServiceFailure(format!(
            "Invalid datetime format from Strava: {}",
            payload.start_date
        ))
    })?;

    let start_date_local = payload
        .start_date_local
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_wall_clock(s).ok_or_else(|| {
                AppError::RemoteServiceFailure(format!("Invalid datetime format from Strava: {}", s))
            })
        })
        .transpose()?;

    Ok(NewActivity {
        strava_activity_id: payload.id,
        name: payload.name,
        activity_type: payload.activity_type.or(payload.sport_type),
        start_date,
        start_date_local,
        timezone: payload.timezone,
        distance_km: payload.distance.map(|meters| meters / 1000.0),
        moving_time_seconds: payload.moving_time,
        elapsed_time_seconds: payload.elapsed_time,
        total_elevation_gain: payload.total_elevation_gain,
        summary_polyline: payload.map.and_then(|m| m.summary_polyline),
        primary_photo_url: extract_primary_photo(&raw),
        raw_payload: raw,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

/// Refresh tokens that expire within this margin (2 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 2 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type for use in AppState.
pub type TokenCache = Arc<DashMap<i64, CachedToken>>;

/// Per-athlete locks that serialize token refreshes.
pub type RefreshLocks = Arc<DashMap<i64, Arc<Mutex<()>>>>;

/// High-level Strava service that manages token lifecycle and API calls.
///
/// Refreshed tokens are written back to the athlete row and cached in memory
/// so later calls in the same sync do not refresh again. Strava rotates the
/// refresh token on every refresh, so only one refresh per athlete may be in
/// flight.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    db: SqliteDb,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
}

impl StravaService {
    /// `token_cache` and `refresh_locks` should be shared by every
    /// `StravaService` in the process.
    pub fn new(
        config: &Config,
        db: SqliteDb,
        token_cache: TokenCache,
        refresh_locks: RefreshLocks,
    ) -> Self {
        Self {
            client: StravaClient::new(
                config.strava_client_id.clone(),
                config.strava_client_secret.clone(),
                config.strava_api_base.clone(),
                config.strava_token_url.clone(),
            ),
            db,
            token_cache,
            refresh_locks,
        }
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expiring) access token for the athlete.
    pub async fn get_valid_access_token(&self, athlete: &Athlete) -> Result<String, AppError> {
        if let Some(token) = self.cached_token(athlete.id, None) {
            return Ok(token);
        }

        if !athlete.tokens.is_present() {
            return Err(AppError::AuthenticationFailure(format!(
                "Athlete {} does not have Strava tokens",
                athlete.id
            )));
        }

        let expires_at = DateTime::from_timestamp(athlete.tokens.expires_at, 0).unwrap_or_default();
        if !expires_soon(expires_at) {
            self.cache_token(athlete.id, athlete.tokens.access_token.clone(), expires_at);
            return Ok(athlete.tokens.access_token.clone());
        }

        tracing::info!(athlete_id = athlete.id, "Access token expiring, refreshing");
        self.refresh_access_token(athlete.id, &athlete.tokens.access_token)
            .await
    }

    /// Cached token that is not about to expire and is not `rejected`.
    fn cached_token(&self, athlete_id: i64, rejected: Option<&str>) -> Option<String> {
        let cached = self
            .token_cache
            .get(&athlete_id)
            .map(|entry| entry.value().clone())?;
        if expires_soon(cached.expires_at) || rejected == Some(cached.access_token.as_str()) {
            return None;
        }
        Some(cached.access_token)
    }

    /// Replace `rejected` with a fresh access token.
    ///
    /// Holds the athlete's refresh lock; a token refreshed by another task
    /// while waiting is reused instead of refreshing again.
    async fn refresh_access_token(&self, athlete_id: i64, rejected: &str) -> Result<String, AppError> {
        let lock = self
            .refresh_locks
            .entry(athlete_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(token) = self.cached_token(athlete_id, Some(rejected)) {
            tracing::debug!(athlete_id, "Token refreshed by another task");
            return Ok(token);
        }

        let stored = self
            .db
            .get_athlete(athlete_id)?
            .ok_or(AppError::OwnerNotFound(athlete_id))?;
        if !stored.tokens.is_present() {
            return Err(AppError::AuthenticationFailure(format!(
                "Athlete {} does not have Strava tokens",
                athlete_id
            )));
        }

        let stored_expiry = DateTime::from_timestamp(stored.tokens.expires_at, 0).unwrap_or_default();
        if stored.tokens.access_token != rejected && !expires_soon(stored_expiry) {
            self.cache_token(athlete_id, stored.tokens.access_token.clone(), stored_expiry);
            return Ok(stored.tokens.access_token);
        }

        let refreshed = self.client.refresh_token(&stored.tokens.refresh_token).await?;

        let tokens = AthleteTokens {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or(stored.tokens.refresh_token),
            expires_at: refreshed.expires_at,
        };
        self.db.update_athlete_tokens(athlete_id, &tokens)?;

        let expires_at = DateTime::from_timestamp(tokens.expires_at, 0).unwrap_or_default();
        self.cache_token(athlete_id, tokens.access_token.clone(), expires_at);

        tracing::info!(athlete_id, "Token refreshed and cached");
        Ok(tokens.access_token)
    }

    fn cache_token(&self, athlete_id: i64, access_token: String, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            athlete_id,
            CachedToken {
                access_token,
                expires_at,
            },
        );
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// List one page of activities newer than `after`.
    pub async fn list_activities(
        &self,
        athlete: &Athlete,
        after: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, AppError> {
        let access_token = self.get_valid_access_token(athlete).await?;
        let after = after.timestamp();

        match self
            .client
            .list_activities(&access_token, after, page, per_page)
            .await
        {
            Err(AppError::AuthenticationFailure(msg)) => {
                tracing::info!(athlete_id = athlete.id, error = %msg, "Strava returned 401, refreshing token");
                let access_token = self.refresh_access_token(athlete.id, &access_token).await?;
                self.client
                    .list_activities(&access_token, after, page, per_page)
                    .await
            }
            other => other,
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(&self, athlete: &Athlete, activity_id: i64) -> Result<Value, AppError> {
        let access_token = self.get_valid_access_token(athlete).await?;

        match self.client.get_activity(&access_token, activity_id).await {
            Err(AppError::AuthenticationFailure(msg)) => {
                tracing::info!(athlete_id = athlete.id, error = %msg, "Strava returned 401, refreshing token");
                let access_token = self.refresh_access_token(athlete.id, &access_token).await?;
                self.client.get_activity(&access_token, activity_id).await
            }
            other => other,
        }
    }
}

fn expires_soon(expires_at: DateTime<Utc>) -> bool {
    Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= expires_at
}

impl ActivityFetcher for StravaService {
    async fn fetch_page(
        &self,
        athlete: &Athlete,
        after: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, AppError> {
        self.list_activities(athlete, after, page, per_page).await
    }

    async fn fetch_detail(&self, athlete: &Athlete, strava_activity_id: i64) -> Result<Value, AppError> {
        self.get_activity(athlete, strava_activity_id).await
    }
}
