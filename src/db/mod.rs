// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (SQLite).

pub mod sqlite;

pub use sqlite::SqliteDb;

use crate::models::NewActivity;

/// A staged activity write, applied by [`SqliteDb::commit_writes`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityWrite {
    /// A remote activity not yet stored for this athlete.
    Insert(NewActivity),
    /// Full replacement of the stored row `id`.
    Replace { id: i64, activity: NewActivity },
}

impl ActivityWrite {
    fn activity_mut(&mut self) -> &mut NewActivity {
        match self {
            ActivityWrite::Insert(activity) | ActivityWrite::Replace { activity, .. } => activity,
        }
    }

    /// Swap in newer normalized fields, keeping the insert/replace target.
    pub fn overwrite(&mut self, activity: NewActivity) {
        *self.activity_mut() = activity;
    }
}
