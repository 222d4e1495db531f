// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! StravaService against a local fake of the Strava API.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, TimeZone, Utc};
use roundup_tracker::config::Config;
use roundup_tracker::db::SqliteDb;
use roundup_tracker::models::NewAthlete;
use roundup_tracker::services::{ActivitySyncer, StravaService, SyncOptions};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;

#[derive(Default)]
struct FakeStrava {
    refreshes: AtomicUsize,
    listings: AtomicUsize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer fresh-access")
}

async fn token(State(fake): State<Arc<FakeStrava>>) -> Json<serde_json::Value> {
    fake.refreshes.fetch_add(1, Ordering::SeqCst);
    // Long enough for a second caller to queue behind the first refresh.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    Json(json!({
        "access_token": "fresh-access",
        "refresh_token": "rotated-refresh",
        "expires_at": (Utc::now() + Duration::hours(6)).timestamp(),
    }))
}

async fn list(State(fake): State<Arc<FakeStrava>>, headers: HeaderMap) -> Response {
    fake.listings.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    Json(json!([{
        "id": 501,
        "type": "Run",
        "start_date": "2025-02-10T15:00:00Z",
        "start_date_local": "2025-02-10T07:00:00-08:00",
        "distance": 5000.0,
        "moving_time": 1500,
        "photos": {"count": 1, "primary": null},
    }]))
    .into_response()
}

async fn detail(headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    Json(json!({
        "id": id,
        "photos": {"count": 1, "primary": {"urls": {"600": "https://img/501.jpg"}}},
    }))
    .into_response()
}

async fn spawn_fake() -> (Config, Arc<FakeStrava>) {
    let fake = Arc::new(FakeStrava::default());
    let app = Router::new()
        .route("/oauth/token", post(token))
        .route("/api/v3/athlete/activities", get(list))
        .route("/api/v3/activities/{id}", get(detail))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = Config {
        strava_api_base: format!("http://{addr}/api/v3"),
        strava_token_url: format!("http://{addr}/oauth/token"),
        ..Config::test_default()
    };
    (config, fake)
}

fn athlete_with_token(db: &SqliteDb, access_token: &str, expires_at: i64) -> i64 {
    db.insert_athlete(&NewAthlete {
        strava_id: 77,
        firstname: "Fake".to_string(),
        lastname: "Strava".to_string(),
        profile_image_url: None,
        access_token: access_token.to_string(),
        refresh_token: "old-refresh".to_string(),
        expires_at,
    })
    .unwrap()
    .id
}

fn service(config: &Config, db: &SqliteDb) -> StravaService {
    StravaService::new(
        config,
        db.clone(),
        Arc::new(dashmap::DashMap::new()),
        Arc::new(dashmap::DashMap::new()),
    )
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let (config, fake) = spawn_fake().await;
    let db = common::test_db();
    let athlete_id = athlete_with_token(&db, "stale-access", 1_000);
    let strava = service(&config, &db);

    let athlete = db.get_athlete(athlete_id).unwrap().unwrap();
    let token = strava.get_valid_access_token(&athlete).await.unwrap();
    assert_eq!(token, "fresh-access");
    assert_eq!(fake.refreshes.load(Ordering::SeqCst), 1);

    let stored = db.get_athlete(athlete_id).unwrap().unwrap();
    assert_eq!(stored.tokens.access_token, "fresh-access");
    assert_eq!(stored.tokens.refresh_token, "rotated-refresh");

    // Served from the cache the second time.
    strava.get_valid_access_token(&athlete).await.unwrap();
    assert_eq!(fake.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unauthorized_call_refreshes_once_and_retries() {
    let (config, fake) = spawn_fake().await;
    let db = common::test_db();
    // Looks valid locally, but the fake rejects it.
    let far_future = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap().timestamp();
    let athlete_id = athlete_with_token(&db, "revoked-access", far_future);
    let strava = service(&config, &db);

    let athlete = db.get_athlete(athlete_id).unwrap().unwrap();
    let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let page = strava.list_activities(&athlete, after, 1, 200).await.unwrap();

    assert_eq!(page.len(), 1);
    assert_eq!(fake.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(fake.listings.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sync_through_http_client() {
    let (config, _fake) = spawn_fake().await;
    let db = common::test_db();
    let athlete_id = athlete_with_token(&db, "stale-access", 1_000);

    let syncer = ActivitySyncer::new(db.clone(), service(&config, &db), SyncOptions::from(&config));
    let summary = syncer.sync(athlete_id, None).await.unwrap();
    assert_eq!((summary.fetched, summary.created), (1, 1));

    let stored = db.find_activity(athlete_id, 501).unwrap().unwrap();
    assert_eq!(
        stored.fields.primary_photo_url.as_deref(),
        Some("https://img/501.jpg")
    );
    assert_eq!(stored.fields.start_date_local.unwrap().to_string(), "2025-02-10 07:00:00");
}

#[tokio::test]
async fn test_missing_tokens_is_authentication_failure() {
    let (config, fake) = spawn_fake().await;
    let db = common::test_db();
    let athlete_id = athlete_with_token(&db, "stale-access", 1_000);
    let strava = service(&config, &db);

    let mut athlete = db.get_athlete(athlete_id).unwrap().unwrap();
    athlete.tokens.access_token.clear();

    let err = strava.get_valid_access_token(&athlete).await.unwrap_err();
    assert!(matches!(
        err,
        roundup_tracker::error::AppError::AuthenticationFailure(_)
    ));
    assert_eq!(fake.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let (config, fake) = spawn_fake().await;
    let db = common::test_db();
    let athlete_id = athlete_with_token(&db, "stale-access", 1_000);
    let strava = service(&config, &db);
    let other = strava.clone();

    let athlete = db.get_athlete(athlete_id).unwrap().unwrap();
    let (first, second) = tokio::join!(
        strava.get_valid_access_token(&athlete),
        other.get_valid_access_token(&athlete),
    );

    assert_eq!(first.unwrap(), "fresh-access");
    assert_eq!(second.unwrap(), "fresh-access");
    assert_eq!(fake.refreshes.load(Ordering::SeqCst), 1);
}
