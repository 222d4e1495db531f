// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Load sample Strava activity payloads into the local database.
//!
//! Payloads go through the same normalization and upsert path as a live
//! sync, so the roundup endpoint can be exercised without Strava access.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use roundup_tracker::db::SqliteDb;
use roundup_tracker::models::{Athlete, NewAthlete};
use roundup_tracker::services::strava::normalize_activity;
use roundup_tracker::services::UpsertPlan;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const SAMPLE_STRAVA_ID: i64 = 999_999_999;

#[derive(Parser, Debug)]
#[command(name = "roundup-seed")]
#[command(about = "Seed the database with sample Strava activities", long_about = None)]
struct Cli {
    /// JSON array of Strava activity payloads
    #[arg(long, value_name = "FILE")]
    json: PathBuf,

    /// Attach activities to this existing athlete instead of the sample one
    #[arg(long)]
    athlete_id: Option<i64>,

    /// SQLite database file (defaults to DATABASE_PATH or roundup.db)
    #[arg(long, env = "DATABASE_PATH", default_value = "roundup.db")]
    database: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let payloads = load_payloads(&cli.json)?;
    let db = SqliteDb::open(&cli.database)?;
    let athlete = ensure_athlete(&db, cli.athlete_id)?;

    let mut plan = UpsertPlan::new(athlete.id);
    for payload in payloads {
        let activity = normalize_activity(payload)?;
        plan.stage(&db, activity)?;
    }
    plan.commit(&db)?;

    tracing::info!(
        athlete_id = athlete.id,
        created = plan.created(),
        updated = plan.updated(),
        "Seeded activities"
    );
    println!(
        "Seeded activities for athlete {}: created={} updated={}",
        athlete.id,
        plan.created(),
        plan.updated()
    );
    Ok(())
}

fn load_payloads(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let data: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    match data {
        Value::Array(items) => Ok(items),
        _ => bail!("Sample data must be a JSON array of activities"),
    }
}

fn ensure_athlete(db: &SqliteDb, athlete_id: Option<i64>) -> Result<Athlete> {
    if let Some(id) = athlete_id {
        return db
            .get_athlete(id)?
            .with_context(|| format!("Athlete with id={} not found", id));
    }

    if let Some(athlete) = db.get_athlete_by_strava_id(SAMPLE_STRAVA_ID)? {
        return Ok(athlete);
    }

    let sample = NewAthlete {
        strava_id: SAMPLE_STRAVA_ID,
        firstname: "Sample".to_string(),
        lastname: "Athlete".to_string(),
        profile_image_url: None,
        access_token: "sample-access-token".to_string(),
        refresh_token: "sample-refresh-token".to_string(),
        expires_at: 2_000_000_000,
    };
    Ok(db.insert_athlete(&sample)?)
}
