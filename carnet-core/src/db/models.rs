use chrono::Duration;
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::entity::{
    BodyPart, Difficulty, Exercise, MuscleGroup, Workout, WorkoutSet, from_epoch,
};

#[derive(FromRow, Debug, Clone)]
pub struct MuscleGroupRow {
    pub id: String,
    pub name: String,
    pub body_part: String,
}

#[derive(FromRow, Debug, Clone)]
pub struct ExerciseRow {
    pub id: String,
    pub name: String,
    pub difficulty: Option<String>,
}

#[derive(FromRow, Debug, Clone)]
pub struct WorkoutRow {
    pub id: String,
    pub name: Option<String>,
    pub date_ts: i64,
    pub body_part: String,
    pub duration: i64,
}

#[derive(FromRow, Debug, Clone)]
pub struct SetRow {
    pub id: String,
    pub workout_id: String,
    pub num: i64,
    pub exercise_id: String,
    pub reps: i64,
    pub weight: f64,
    pub date_ts: i64,
}

#[derive(FromRow, Debug, Clone)]
pub struct SyncMetaRow {
    pub table_name: String,
    pub last_update: i64,
}

impl MuscleGroup {
    pub fn from_row(row: MuscleGroupRow) -> Self {
        MuscleGroup {
            id: row.id,
            name: Some(row.name),
            body_part: Some(row.body_part),
        }
    }
}

impl Exercise {
    pub fn from_row(row: ExerciseRow, muscle_groups: Vec<MuscleGroup>) -> Self {
        Exercise {
            id: row.id,
            name: Some(row.name),
            muscle_groups,
            difficulty: row.difficulty.as_deref().and_then(Difficulty::parse),
        }
    }
}

impl WorkoutSet {
    pub fn from_row(row: SetRow) -> Self {
        WorkoutSet {
            id: row.id,
            workout_id: Some(row.workout_id),
            exercise_id: Some(row.exercise_id),
            num: row.num.max(0) as u32,
            reps: row.reps.max(0) as u32,
            weight: row.weight,
            date: Some(from_epoch(row.date_ts)),
        }
    }
}

impl Workout {
    /// Leaves `content` empty; sets are attached with [`Workout::with_sets`]
    /// once their exercise names are resolved.
    pub fn from_row(row: WorkoutRow) -> Self {
        Workout {
            id: row.id,
            name: row.name,
            body_part: BodyPart::parse(&row.body_part),
            date: Some(from_epoch(row.date_ts)),
            duration: Duration::seconds(row.duration),
            content: BTreeMap::new(),
        }
    }
}
