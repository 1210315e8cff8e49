//! Entity model: muscle groups, exercises, sets and workouts.
//!
//! Entities are plain values rebuilt on every access. Each data source owns
//! its own constructor (`from_row` in [`crate::db::models`],
//! `from_remote_payload` in [`crate::notion::parse`]) and both must yield the
//! same value for the same underlying record.

mod exercise;
mod workout;

pub use exercise::{Difficulty, Exercise, MuscleGroup};
pub use workout::{BodyPart, Workout, WorkoutSet};

use chrono::{DateTime, Utc};

/// Converts a timestamp to the stored representation (epoch seconds).
pub fn to_epoch(date: &DateTime<Utc>) -> i64 {
    date.timestamp()
}

/// Inverse of [`to_epoch`]. Out-of-range values clamp to the epoch.
pub fn from_epoch(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Drops sub-second precision, which the store does not keep.
pub fn truncate_to_seconds(date: DateTime<Utc>) -> DateTime<Utc> {
    from_epoch(date.timestamp())
}
