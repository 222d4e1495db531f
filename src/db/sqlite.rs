// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Athletes (profile and Strava tokens)
//! - Activities (normalized Strava activities)

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::db::ActivityWrite;
use crate::error::AppError;
use crate::models::{Activity, Athlete, AthleteTokens, NewActivity, NewAthlete};
use crate::time_utils::{format_naive_storage, format_utc_storage, parse_utc_lenient, parse_wall_clock};

const ACTIVITY_COLUMNS: &str = "id, athlete_id, strava_activity_id, name, activity_type, \
     start_date, start_date_local, timezone, distance_km, moving_time_seconds, \
     elapsed_time_seconds, total_elevation_gain, summary_polyline, primary_photo_url, \
     raw_payload, created_at, updated_at";

/// Last year whose storage text sorts in time order.
const MAX_SORTABLE_YEAR: i32 = 9999;

const ATHLETE_COLUMNS: &str =
    "id, strava_id, firstname, lastname, profile_image_url, access_token, refresh_token, expires_at";

/// SQLite database client. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct SqliteDb {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDb {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| AppError::Database(format!("Failed to open {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "Opened SQLite database");
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and the benchmark.
    pub fn in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), AppError> {
        self.lock()?.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS athletes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strava_id INTEGER NOT NULL UNIQUE,
                firstname TEXT NOT NULL,
                lastname TEXT NOT NULL,
                profile_image_url TEXT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                athlete_id INTEGER NOT NULL REFERENCES athletes(id) ON DELETE CASCADE,
                strava_activity_id INTEGER NOT NULL,
                name TEXT NULL,
                activity_type TEXT NULL,
                start_date TEXT NOT NULL,
                start_date_local TEXT NULL,
                timezone TEXT NULL,
                distance_km REAL NULL,
                moving_time_seconds INTEGER NULL,
                elapsed_time_seconds INTEGER NULL,
                total_elevation_gain REAL NULL,
                summary_polyline TEXT NULL,
                primary_photo_url TEXT NULL,
                raw_payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ix_activities_athlete_strava
                ON activities(athlete_id, strava_activity_id);
            CREATE INDEX IF NOT EXISTS ix_activities_start_date
                ON activities(athlete_id, start_date);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Database("SQLite connection mutex poisoned".to_string()))
    }

    // ─── Athlete Operations ──────────────────────────────────────

    /// Check whether an athlete exists.
    pub fn athlete_exists(&self, athlete_id: i64) -> Result<bool, AppError> {
        let found: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT id FROM athletes WHERE id = ?1",
                params![athlete_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Get an athlete by local ID.
    pub fn get_athlete(&self, athlete_id: i64) -> Result<Option<Athlete>, AppError> {
        let sql = format!("SELECT {ATHLETE_COLUMNS} FROM athletes WHERE id = ?1");
        let athlete = self
            .lock()?
            .query_row(&sql, params![athlete_id], map_athlete)
            .optional()?;
        Ok(athlete)
    }

    /// Get an athlete by Strava athlete ID.
    pub fn get_athlete_by_strava_id(&self, strava_id: i64) -> Result<Option<Athlete>, AppError> {
        let sql = format!("SELECT {ATHLETE_COLUMNS} FROM athletes WHERE strava_id = ?1");
        let athlete = self
            .lock()?
            .query_row(&sql, params![strava_id], map_athlete)
            .optional()?;
        Ok(athlete)
    }

    /// List all athletes ordered by local ID.
    pub fn list_athletes(&self) -> Result<Vec<Athlete>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {ATHLETE_COLUMNS} FROM athletes ORDER BY id"))?;
        let athletes = stmt
            .query_map([], map_athlete)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(athletes)
    }

    /// Register an athlete and return the stored row.
    pub fn insert_athlete(&self, athlete: &NewAthlete) -> Result<Athlete, AppError> {
        let id = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO athletes (strava_id, firstname, lastname, profile_image_url, \
                 access_token, refresh_token, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    athlete.strava_id,
                    athlete.firstname,
                    athlete.lastname,
                    athlete.profile_image_url,
                    athlete.access_token,
                    athlete.refresh_token,
                    athlete.expires_at,
                ],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(rusqlite::ErrorCode::ConstraintViolation) => AppError::BadRequest(format!(
                    "Athlete with strava_id {} already exists",
                    athlete.strava_id
                )),
                _ => AppError::from(e),
            })?;
            conn.last_insert_rowid()
        };

        self.get_athlete(id)?
            .ok_or_else(|| AppError::Database(format!("Athlete {} vanished after insert", id)))
    }

    /// Store refreshed tokens for an athlete.
    pub fn update_athlete_tokens(
        &self,
        athlete_id: i64,
        tokens: &AthleteTokens,
    ) -> Result<(), AppError> {
        let changed = self.lock()?.execute(
            "UPDATE athletes SET access_token = ?1, refresh_token = ?2, expires_at = ?3 \
             WHERE id = ?4",
            params![
                tokens.access_token,
                tokens.refresh_token,
                tokens.expires_at,
                athlete_id
            ],
        )?;
        if changed == 0 {
            return Err(AppError::OwnerNotFound(athlete_id));
        }
        Ok(())
    }

    /// Delete an athlete. Their activities go with them.
    pub fn delete_athlete(&self, athlete_id: i64) -> Result<bool, AppError> {
        let changed = self
            .lock()?
            .execute("DELETE FROM athletes WHERE id = ?1", params![athlete_id])?;
        Ok(changed > 0)
    }

    // ─── Activity Operations ─────────────────────────────────────

    /// Activities with `start <= start_date < end`, oldest first.
    pub fn get_activities_in_range(
        &self,
        athlete_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>, AppError> {
        // Five-digit years no longer sort as text; nothing stored can reach them.
        let end_key = (end.year() <= MAX_SORTABLE_YEAR).then(|| format_utc_storage(end));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities \
             WHERE athlete_id = ?1 AND start_date >= ?2 AND (?3 IS NULL OR start_date < ?3) \
             ORDER BY start_date ASC, id ASC"
        ))?;
        let activities = stmt
            .query_map(
                params![athlete_id, format_utc_storage(start), end_key],
                map_activity,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(activities)
    }

    /// Look up an activity by its natural key.
    pub fn find_activity(
        &self,
        athlete_id: i64,
        strava_activity_id: i64,
    ) -> Result<Option<Activity>, AppError> {
        let conn = self.lock()?;
        find_activity_in(&conn, athlete_id, strava_activity_id)
    }

    /// The athlete's most recent activity by `start_date`.
    pub fn latest_activity(&self, athlete_id: i64) -> Result<Option<Activity>, AppError> {
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE athlete_id = ?1 \
             ORDER BY start_date DESC, id DESC LIMIT 1"
        );
        let activity = self
            .lock()?
            .query_row(&sql, params![athlete_id], map_activity)
            .optional()?;
        Ok(activity)
    }

    /// Number of stored activities for an athlete.
    pub fn count_activities(&self, athlete_id: i64) -> Result<u64, AppError> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM activities WHERE athlete_id = ?1",
            params![athlete_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Insert a single activity outside of any plan.
    pub fn insert_activity(&self, athlete_id: i64, activity: &NewActivity) -> Result<i64, AppError> {
        let conn = self.lock()?;
        insert_activity_in(&conn, athlete_id, activity, Utc::now())
    }

    /// Replace every normalized field of an existing activity.
    pub fn replace_activity(&self, id: i64, activity: &NewActivity) -> Result<(), AppError> {
        let conn = self.lock()?;
        replace_activity_in(&conn, id, activity, Utc::now())
    }

    /// Apply a batch of staged writes in one transaction.
    ///
    /// Either every write lands or none do; the transaction rolls back when
    /// dropped uncommitted.
    pub fn commit_writes(&self, athlete_id: i64, writes: &[ActivityWrite]) -> Result<(), AppError> {
        let mut conn = self.lock()?;
        let tx: Transaction<'_> = conn.transaction()?;
        let now = Utc::now();

        for write in writes {
            match write {
                ActivityWrite::Insert(activity) => {
                    insert_activity_in(&tx, athlete_id, activity, now)?;
                }
                ActivityWrite::Replace { id, activity } => {
                    replace_activity_in(&tx, *id, activity, now)?;
                }
            }
        }

        tx.commit()?;
        tracing::debug!(athlete_id, writes = writes.len(), "Committed activity writes");
        Ok(())
    }
}

fn find_activity_in(
    conn: &Connection,
    athlete_id: i64,
    strava_activity_id: i64,
) -> Result<Option<Activity>, AppError> {
    let sql = format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities \
         WHERE athlete_id = ?1 AND strava_activity_id = ?2"
    );
    let activity = conn
        .query_row(&sql, params![athlete_id, strava_activity_id], map_activity)
        .optional()?;
    Ok(activity)
}

fn insert_activity_in(
    conn: &Connection,
    athlete_id: i64,
    activity: &NewActivity,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let stamp = format_utc_storage(now);
    conn.execute(
        "INSERT INTO activities (athlete_id, strava_activity_id, name, activity_type, \
         start_date, start_date_local, timezone, distance_km, moving_time_seconds, \
         elapsed_time_seconds, total_elevation_gain, summary_polyline, primary_photo_url, \
         raw_payload, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            athlete_id,
            activity.strava_activity_id,
            activity.name,
            activity.activity_type,
            format_utc_storage(activity.start_date),
            activity.start_date_local.map(format_naive_storage),
            activity.timezone,
            activity.distance_km,
            activity.moving_time_seconds,
            activity.elapsed_time_seconds,
            activity.total_elevation_gain,
            activity.summary_polyline,
            activity.primary_photo_url,
            activity.raw_payload,
            stamp,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn replace_activity_in(
    conn: &Connection,
    id: i64,
    activity: &NewActivity,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE activities SET strava_activity_id = ?1, name = ?2, activity_type = ?3, \
         start_date = ?4, start_date_local = ?5, timezone = ?6, distance_km = ?7, \
         moving_time_seconds = ?8, elapsed_time_seconds = ?9, total_elevation_gain = ?10, \
         summary_polyline = ?11, primary_photo_url = ?12, raw_payload = ?13, updated_at = ?14 \
         WHERE id = ?15",
        params![
            activity.strava_activity_id,
            activity.name,
            activity.activity_type,
            format_utc_storage(activity.start_date),
            activity.start_date_local.map(format_naive_storage),
            activity.timezone,
            activity.distance_km,
            activity.moving_time_seconds,
            activity.elapsed_time_seconds,
            activity.total_elevation_gain,
            activity.summary_polyline,
            activity.primary_photo_url,
            activity.raw_payload,
            format_utc_storage(now),
            id,
        ],
    )?;
    if changed == 0 {
        return Err(AppError::Database(format!("Activity {} not found for update", id)));
    }
    Ok(())
}

fn map_athlete(row: &Row<'_>) -> rusqlite::Result<Athlete> {
    Ok(Athlete {
        id: row.get(0)?,
        strava_id: row.get(1)?,
        firstname: row.get(2)?,
        lastname: row.get(3)?,
        profile_image_url: row.get(4)?,
        tokens: AthleteTokens {
            access_token: row.get(5)?,
            refresh_token: row.get(6)?,
            expires_at: row.get(7)?,
        },
    })
}

fn map_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        athlete_id: row.get(1)?,
        fields: NewActivity {
            strava_activity_id: row.get(2)?,
            name: row.get(3)?,
            activity_type: row.get(4)?,
            start_date: utc_column(row, 5)?,
            start_date_local: row
                .get::<_, Option<String>>(6)?
                .map(|raw| wall_clock_column(6, &raw))
                .transpose()?,
            timezone: row.get(7)?,
            distance_km: row.get(8)?,
            moving_time_seconds: row.get(9)?,
            elapsed_time_seconds: row.get(10)?,
            total_elevation_gain: row.get(11)?,
            summary_polyline: row.get(12)?,
            primary_photo_url: row.get(13)?,
            raw_payload: row.get(14)?,
        },
        created_at: utc_column(row, 15)?,
        updated_at: utc_column(row, 16)?,
    })
}

fn utc_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_utc_lenient(&raw).ok_or_else(|| conversion_error(idx, &raw))
}

fn wall_clock_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    parse_wall_clock(raw).ok_or_else(|| conversion_error(idx, raw))
}

fn conversion_error(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(format!("invalid timestamp {raw:?}"))),
    )
}
