// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Incremental activity sync.
//!
//! Handles the core workflow:
//! 1. Pick the cutoff (explicit `since`, else latest stored start minus a minute)
//! 2. Page through Strava activities newer than the cutoff
//! 3. Normalize each payload, fetching details when a photo is missing
//! 4. Stage inserts/replacements in memory
//! 5. Commit every staged write in one transaction

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::config::{Config, PhotoBackfillPolicy};
use crate::db::{ActivityWrite, SqliteDb};
use crate::error::{AppError, Result};
use crate::models::{Athlete, NewActivity, SyncSummary};
use crate::services::strava::{extract_primary_photo, normalize_activity};

/// Remote source of raw activity payloads.
pub trait ActivityFetcher {
    /// One page of activities started strictly after `after`.
    fn fetch_page(
        &self,
        athlete: &Athlete,
        after: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Full detail payload for a single activity.
    fn fetch_detail(
        &self,
        athlete: &Athlete,
        strava_activity_id: i64,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// Knobs for a sync pass.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub baseline: DateTime<Utc>,
    pub page_size: u32,
    pub photo_backfill: PhotoBackfillPolicy,
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            baseline: config.sync_baseline,
            page_size: config.sync_page_size,
            photo_backfill: config.photo_backfill,
        }
    }
}

/// Lower bound for the remote `after` filter.
///
/// Strava's `after` is exclusive, so the latest stored start is backed off by
/// a minute to pick up edits to that activity. Never earlier than `baseline`.
pub fn compute_cutoff(
    since: Option<DateTime<Utc>>,
    latest_stored: Option<DateTime<Utc>>,
    baseline: DateTime<Utc>,
) -> DateTime<Utc> {
    let candidate = since.or_else(|| latest_stored.map(|latest| latest - Duration::minutes(1)));
    match candidate {
        Some(cutoff) if cutoff >= baseline => cutoff,
        _ => baseline,
    }
}

/// Writes staged for one athlete, plus the counters reported back.
#[derive(Debug)]
pub struct UpsertPlan {
    athlete_id: i64,
    writes: Vec<ActivityWrite>,
    /// strava_activity_id -> index into `writes`
    staged: HashMap<i64, usize>,
    created: u32,
    updated: u32,
    latest_activity: Option<DateTime<Utc>>,
}

impl UpsertPlan {
    pub fn new(athlete_id: i64) -> Self {
        Self {
            athlete_id,
            writes: Vec::new(),
            staged: HashMap::new(),
            created: 0,
            updated: 0,
            latest_activity: None,
        }
    }

    /// Stage one normalized activity as an insert or a full replace.
    ///
    /// An activity already staged in this plan is overwritten in place and
    /// counted as an update.
    pub fn stage(&mut self, db: &SqliteDb, activity: NewActivity) -> Result<()> {
        self.latest_activity = self.latest_activity.max(Some(activity.start_date));

        let remote_id = activity.strava_activity_id;
        if let Some(&idx) = self.staged.get(&remote_id) {
            self.writes[idx].overwrite(activity);
            self.updated += 1;
            return Ok(());
        }

        let write = match db.find_activity(self.athlete_id, remote_id)? {
            Some(existing) => {
                self.updated += 1;
                ActivityWrite::Replace {
                    id: existing.id,
                    activity,
                }
            }
            None => {
                self.created += 1;
                ActivityWrite::Insert(activity)
            }
        };

        self.staged.insert(remote_id, self.writes.len());
        self.writes.push(write);
        Ok(())
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    pub fn updated(&self) -> u32 {
        self.updated
    }

    pub fn latest_activity(&self) -> Option<DateTime<Utc>> {
        self.latest_activity
    }

    /// Apply every staged write atomically.
    pub fn commit(&self, db: &SqliteDb) -> Result<()> {
        db.commit_writes(self.athlete_id, &self.writes)
    }
}

/// Pulls new and edited activities for an athlete into the store.
pub struct ActivitySyncer<F> {
    db: SqliteDb,
    fetcher: F,
    options: SyncOptions,
}

impl<F: ActivityFetcher> ActivitySyncer<F> {
    pub fn new(db: SqliteDb, fetcher: F, options: SyncOptions) -> Self {
        Self {
            db,
            fetcher,
            options,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Sync an athlete's activities newer than the effective cutoff.
    ///
    /// Nothing is written unless every remote call succeeds.
    pub async fn sync(&self, athlete_id: i64, since: Option<DateTime<Utc>>) -> Result<SyncSummary> {
        let athlete = self
            .db
            .get_athlete(athlete_id)?
            .ok_or(AppError::OwnerNotFound(athlete_id))?;

        let latest_stored = match since {
            Some(_) => None,
            None => self
                .db
                .latest_activity(athlete_id)?
                .map(|activity| activity.fields.start_date),
        };
        let cutoff = compute_cutoff(since, latest_stored, self.options.baseline);
        let per_page = self.options.page_size.max(1);

        tracing::info!(athlete_id, cutoff = %cutoff, per_page, "Starting activity sync");

        let mut plan = UpsertPlan::new(athlete_id);
        let mut fetched = 0u32;
        let mut page = 1u32;

        loop {
            let raw_page = self
                .fetcher
                .fetch_page(&athlete, cutoff, page, per_page)
                .await?;
            let page_len = raw_page.len();
            tracing::debug!(athlete_id, page, count = page_len, "Fetched activity page");

            for raw in raw_page {
                fetched += 1;
                let mut activity = normalize_activity(raw)?;
                if activity.needs_photo_backfill() {
                    self.backfill_photo(&athlete, &mut activity).await?;
                }
                plan.stage(&self.db, activity)?;
            }

            if page_len < per_page as usize {
                break;
            }
            page += 1;
        }

        plan.commit(&self.db)?;

        let summary = SyncSummary {
            fetched,
            created: plan.created(),
            updated: plan.updated(),
            latest_activity: plan.latest_activity(),
            synced_at: Utc::now(),
        };

        tracing::info!(
            athlete_id,
            fetched = summary.fetched,
            created = summary.created,
            updated = summary.updated,
            "Activity sync complete"
        );

        Ok(summary)
    }

    /// One detail fetch to recover a primary photo the summary omitted.
    async fn backfill_photo(&self, athlete: &Athlete, activity: &mut NewActivity) -> Result<()> {
        let activity_id = activity.strava_activity_id;

        let detail = match self.fetcher.fetch_detail(athlete, activity_id).await {
            Ok(detail) => detail,
            Err(e) if self.options.photo_backfill == PhotoBackfillPolicy::Skip => {
                tracing::warn!(
                    athlete_id = athlete.id,
                    activity_id,
                    error = %e,
                    "Photo backfill failed, storing activity without photo"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        activity.primary_photo_url = extract_primary_photo(&detail);
        if let Some(raw) = activity.raw_payload.as_object_mut() {
            raw.insert(
                "photos".to_string(),
                detail.get("photos").cloned().unwrap_or(Value::Null),
            );
        }

        tracing::debug!(
            athlete_id = athlete.id,
            activity_id,
            found = activity.primary_photo_url.is_some(),
            "Photo backfill fetched activity detail"
        );
        Ok(())
    }
}
