// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time parsing and formatting.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Fixed-width storage format. Lexicographic order matches time order.
const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const NAIVE_STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format a UTC timestamp for a sortable TEXT column.
pub fn format_utc_storage(date: DateTime<Utc>) -> String {
    date.format(STORAGE_FORMAT).to_string()
}

/// Format a wall-clock timestamp for a TEXT column.
pub fn format_naive_storage(date: NaiveDateTime) -> String {
    date.format(NAIVE_STORAGE_FORMAT).to_string()
}

/// Parse a timestamp into UTC. Offsets are honored; naive values are UTC.
pub fn parse_utc_lenient(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_naive(raw).map(|naive| naive.and_utc())
}

/// Parse a timestamp into its wall-clock reading, discarding any offset.
///
/// `2025-01-10T21:30:00-08:00` and `2025-01-10T21:30:00Z` both read 21:30 on
/// January 10th.
pub fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    parse_naive(raw)
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
