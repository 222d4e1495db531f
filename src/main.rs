// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Roundup-Tracker API Server
//!
//! Syncs Strava activities into SQLite and serves monthly roundups.

use roundup_tracker::{config::Config, db::SqliteDb, services::StravaService, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Roundup-Tracker API");

    let db = SqliteDb::open(&config.database_path)?;
    tracing::info!(path = %config.database_path, "Database opened");

    // Shared across every request handled by this process
    let token_cache = Arc::new(dashmap::DashMap::new());
    let refresh_locks = Arc::new(dashmap::DashMap::new());
    let strava_service = StravaService::new(&config, db.clone(), token_cache, refresh_locks);

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        strava_service,
    });

    let app = roundup_tracker::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roundup_tracker=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
