// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Utc};
use roundup_tracker::config::Config;
use roundup_tracker::db::SqliteDb;
use roundup_tracker::error::{AppError, Result};
use roundup_tracker::models::{Athlete, NewAthlete};
use roundup_tracker::routes::create_router;
use roundup_tracker::services::strava::normalize_activity;
use roundup_tracker::services::{ActivityFetcher, StravaService};
use roundup_tracker::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Fresh in-memory database.
#[allow(dead_code)]
pub fn test_db() -> SqliteDb {
    SqliteDb::in_memory().expect("in-memory database")
}

/// Register an athlete with long-lived tokens.
#[allow(dead_code)]
pub fn create_athlete(db: &SqliteDb, strava_id: i64) -> Athlete {
    db.insert_athlete(&NewAthlete {
        strava_id,
        firstname: "Test".to_string(),
        lastname: "Athlete".to_string(),
        profile_image_url: None,
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at: 4_000_000_000,
    })
    .expect("insert athlete")
}

/// Minimal Strava summary payload.
#[allow(dead_code)]
pub fn payload(
    id: i64,
    activity_type: &str,
    start_date: &str,
    start_date_local: &str,
    distance_m: f64,
    moving_time: i64,
) -> Value {
    json!({
        "id": id,
        "name": format!("Activity {id}"),
        "type": activity_type,
        "start_date": start_date,
        "start_date_local": start_date_local,
        "timezone": "(GMT+00:00) UTC",
        "distance": distance_m,
        "moving_time": moving_time,
        "elapsed_time": moving_time,
        "total_elevation_gain": 10.0,
        "map": {"summary_polyline": "abc"},
    })
}

/// Normalize and store a payload directly, bypassing the sync.
#[allow(dead_code)]
pub fn store(db: &SqliteDb, athlete_id: i64, raw: Value) {
    let activity = normalize_activity(raw).expect("normalize");
    db.insert_activity(athlete_id, &activity).expect("insert activity");
}

/// A remote call seen by [`StubFetcher`].
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum FetchCall {
    Page { after: DateTime<Utc>, page: u32, per_page: u32 },
    Detail(i64),
}

enum ScriptedPage {
    Items(Vec<Value>),
    RemoteFailure(String),
    Unauthorized(String),
}

/// Scripted stand-in for Strava.
///
/// Pages are served in order by page number; a page index past the script
/// returns an empty page.
#[allow(dead_code)]
#[derive(Default)]
pub struct StubFetcher {
    pages: Vec<ScriptedPage>,
    details: HashMap<i64, std::result::Result<Value, String>>,
    calls: Mutex<Vec<FetchCall>>,
}

#[allow(dead_code)]
impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, items: Vec<Value>) -> Self {
        self.pages.push(ScriptedPage::Items(items));
        self
    }

    pub fn with_failing_page(mut self, message: &str) -> Self {
        self.pages.push(ScriptedPage::RemoteFailure(message.to_string()));
        self
    }

    pub fn with_unauthorized_page(mut self, message: &str) -> Self {
        self.pages.push(ScriptedPage::Unauthorized(message.to_string()));
        self
    }

    pub fn with_detail(mut self, id: i64, detail: Value) -> Self {
        self.details.insert(id, Ok(detail));
        self
    }

    pub fn with_failing_detail(mut self, id: i64, message: &str) -> Self {
        self.details.insert(id, Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: FetchCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ActivityFetcher for StubFetcher {
    async fn fetch_page(
        &self,
        _athlete: &Athlete,
        after: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>> {
        self.record(FetchCall::Page { after, page, per_page });
        match self.pages.get(page as usize - 1) {
            Some(ScriptedPage::Items(items)) => Ok(items.clone()),
            Some(ScriptedPage::RemoteFailure(message)) => {
                Err(AppError::RemoteServiceFailure(message.clone()))
            }
            Some(ScriptedPage::Unauthorized(message)) => {
                Err(AppError::AuthenticationFailure(message.clone()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_detail(&self, _athlete: &Athlete, strava_activity_id: i64) -> Result<Value> {
        self.record(FetchCall::Detail(strava_activity_id));
        match self.details.get(&strava_activity_id) {
            Some(Ok(detail)) => Ok(detail.clone()),
            Some(Err(message)) => Err(AppError::RemoteServiceFailure(message.clone())),
            None => Err(AppError::RemoteServiceFailure(format!(
                "no detail scripted for {strava_activity_id}"
            ))),
        }
    }
}

/// Create a test app backed by an in-memory database.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db();
    let token_cache = Arc::new(dashmap::DashMap::new());
    let refresh_locks = Arc::new(dashmap::DashMap::new());
    let strava_service = StravaService::new(&config, db.clone(), token_cache, refresh_locks);

    let state = Arc::new(AppState {
        config,
        db,
        strava_service,
    });

    (create_router(state.clone()), state)
}
