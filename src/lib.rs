// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Roundup-Tracker: monthly activity roundups from Strava data
//!
//! This crate provides the backend API for syncing Strava activities into a
//! local store and summarizing each athlete's month as a calendar.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SqliteDb;
use services::StravaService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SqliteDb,
    pub strava_service: StravaService,
}
