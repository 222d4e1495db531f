// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlete, sync, and roundup endpoints.

use crate::error::{AppError, Result};
use crate::models::{Athlete, MonthlyRoundup, NewAthlete, SyncSummary};
use crate::services::{ActivitySyncer, RoundupService, SyncOptions};
use crate::time_utils::parse_utc_lenient;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/athletes", get(list_athletes).post(create_athlete))
        .route("/athletes/{athlete_id}/sync", post(sync_activities))
        .route("/athletes/{athlete_id}/roundup", get(get_roundup))
}

// ─── Athletes ────────────────────────────────────────────────

/// Register an athlete with their current Strava credentials.
async fn create_athlete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewAthlete>,
) -> Result<(StatusCode, Json<Athlete>)> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let athlete = state.db.insert_athlete(&body)?;
    tracing::info!(athlete_id = athlete.id, strava_id = athlete.strava_id, "Athlete created");

    Ok((StatusCode::CREATED, Json(athlete)))
}

async fn list_athletes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Athlete>>> {
    Ok(Json(state.db.list_athletes()?))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SyncQuery {
    /// Override the cutoff (ISO 8601)
    since: Option<String>,
}

/// Pull new and edited activities from Strava.
async fn sync_activities(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<i64>,
    Query(params): Query<SyncQuery>,
) -> Result<Json<SyncSummary>> {
    let since = match params.since.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_utc_lenient(raw).ok_or_else(|| {
            AppError::BadRequest(format!("since must be an ISO 8601 date or timestamp (got {raw:?})"))
        })?),
    };

    let syncer = ActivitySyncer::new(
        state.db.clone(),
        state.strava_service.clone(),
        SyncOptions::from(&state.config),
    );
    let summary = syncer.sync(athlete_id, since).await?;

    Ok(Json(summary))
}

// ─── Roundup ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct RoundupQuery {
    /// "YYYY-MM"; defaults to the current month
    month: Option<String>,
}

async fn get_roundup(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<i64>,
    Query(params): Query<RoundupQuery>,
) -> Result<Json<MonthlyRoundup>> {
    let service = RoundupService::new(state.db.clone());
    let roundup = service.build(athlete_id, params.month.as_deref())?;
    Ok(Json(roundup))
}
