use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{Acquire, Sqlite, SqliteConnection};
use std::collections::HashMap;

use crate::db::errors::{Attempted, StoreError};
use crate::db::models::{ExerciseRow, MuscleGroupRow, SetRow, SyncMetaRow, WorkoutRow};
use crate::entity::{Exercise, MuscleGroup, Workout, WorkoutSet, from_epoch, to_epoch};

pub type StoreResult<T> = Result<T, StoreError>;

/// Target score written for every exercise/muscle-group link; the remote
/// catalog does not carry one.
const DEFAULT_TARGET_SCORE: i64 = 5;

fn show<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_string())
}

// Muscle groups

async fn write_muscle_group(conn: &mut SqliteConnection, group: &MuscleGroup) -> StoreResult<()> {
    let attempted = Attempted(vec![
        ("id", group.id.clone()),
        ("name", show(group.name.as_ref())),
        ("body_part", show(group.body_part.as_ref())),
    ]);
    sqlx::query(
        "INSERT INTO muscle_group (id, name, body_part)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             body_part = excluded.body_part",
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(&group.body_part)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::classify(e, "muscle_group", &attempted))?;
    debug!("Muscle group saved: {} - {}", group, group.id);
    Ok(())
}

/// Upserts one or many muscle groups; all of them or none are written.
pub async fn upsert_muscle_groups<'a, A>(conn: A, groups: &[MuscleGroup]) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut tx = conn.begin().await?;
    for group in groups {
        write_muscle_group(&mut *tx, group).await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn upsert_muscle_group<'a, A>(conn: A, group: &MuscleGroup) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    upsert_muscle_groups(conn, std::slice::from_ref(group)).await
}

pub async fn get_muscle_group_by_id<'a, A>(conn: A, id: &str) -> StoreResult<MuscleGroup>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    sqlx::query_as::<_, MuscleGroupRow>(
        "SELECT id, name, body_part FROM muscle_group WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .map(MuscleGroup::from_row)
    .ok_or_else(|| StoreError::not_found("muscle_group", id))
}

// Exercises

/// Upserts the exercise row and replaces its muscle-group links in one
/// transaction. The referenced muscle groups must already be stored.
pub async fn upsert_exercise<'a, A>(conn: A, exercise: &Exercise) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let group_ids: Vec<&str> = exercise.muscle_groups.iter().map(|g| g.id.as_str()).collect();
    let attempted = Attempted(vec![
        ("id", exercise.id.clone()),
        ("name", show(exercise.name.as_ref())),
        ("difficulty", show(exercise.difficulty.map(|d| d.as_str()))),
        ("muscle_groups", format!("{:?}", group_ids)),
    ]);

    let mut tx = conn.begin().await?;
    sqlx::query(
        "INSERT INTO exercises (id, name, difficulty)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             difficulty = excluded.difficulty",
    )
    .bind(&exercise.id)
    .bind(&exercise.name)
    .bind(exercise.difficulty.map(|d| d.as_str()))
    .execute(&mut *tx)
    .await
    .map_err(|e| StoreError::classify(e, "exercises", &attempted))?;

    sqlx::query("DELETE FROM exercise_muscle_group WHERE exercise_id = ?1")
        .bind(&exercise.id)
        .execute(&mut *tx)
        .await?;

    for (position, group_id) in group_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO exercise_muscle_group (exercise_id, muscle_group_id, position, target_score)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(exercise_id, muscle_group_id) DO NOTHING",
        )
        .bind(&exercise.id)
        .bind(group_id)
        .bind(position as i64)
        .bind(DEFAULT_TARGET_SCORE)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::classify(e, "exercise_muscle_group", &attempted))?;
    }

    tx.commit().await?;
    debug!("Exercise saved: {} - {}", exercise, exercise.id);
    Ok(())
}

async fn muscle_groups_of(conn: &mut SqliteConnection, exercise_id: &str) -> StoreResult<Vec<MuscleGroup>> {
    let rows = sqlx::query_as::<_, MuscleGroupRow>(
        "SELECT mg.id, mg.name, mg.body_part
         FROM exercise_muscle_group AS emg
         JOIN muscle_group AS mg ON mg.id = emg.muscle_group_id
         WHERE emg.exercise_id = ?1
         ORDER BY emg.position ASC",
    )
    .bind(exercise_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(MuscleGroup::from_row).collect())
}

async fn exercise_where(
    conn: &mut SqliteConnection,
    column: &'static str,
    value: &str,
) -> StoreResult<Option<Exercise>> {
    let sql = format!("SELECT id, name, difficulty FROM exercises WHERE {} = ?1", column);
    let Some(row) = sqlx::query_as::<_, ExerciseRow>(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let groups = muscle_groups_of(conn, &row.id).await?;
    Ok(Some(Exercise::from_row(row, groups)))
}

pub async fn get_exercise_by_id<'a, A>(conn: A, id: &str) -> StoreResult<Exercise>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    exercise_where(&mut *conn, "id", id)
        .await?
        .ok_or_else(|| StoreError::not_found("exercises", id))
}

/// Fails with `NotFound` when no exercise carries `name`.
pub async fn get_exercise_by_name<'a, A>(conn: A, name: &str) -> StoreResult<Exercise>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    exercise_where(&mut *conn, "name", name)
        .await?
        .ok_or_else(|| StoreError::not_found("exercises", name))
}

pub async fn exercise_exists<'a, A>(conn: A, id: &str) -> StoreResult<bool>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM exercises WHERE id = ?1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

pub async fn list_exercises<'a, A>(conn: A) -> StoreResult<Vec<Exercise>>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let rows = sqlx::query_as::<_, ExerciseRow>(
        "SELECT id, name, difficulty FROM exercises ORDER BY name ASC",
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut exercises = Vec::with_capacity(rows.len());
    for row in rows {
        let groups = muscle_groups_of(&mut *conn, &row.id).await?;
        exercises.push(Exercise::from_row(row, groups));
    }
    Ok(exercises)
}

// Sets

fn set_attempted(set: &WorkoutSet) -> Attempted {
    Attempted(vec![
        ("id", set.id.clone()),
        ("workout_id", show(set.workout_id.as_ref())),
        ("num", set.num.to_string()),
        ("exercise_id", show(set.exercise_id.as_ref())),
        ("reps", set.reps.to_string()),
        ("weight", set.weight.to_string()),
        ("date_ts", show(set.date.as_ref().map(to_epoch))),
    ])
}

async fn write_set(conn: &mut SqliteConnection, set: &WorkoutSet) -> StoreResult<()> {
    let attempted = set_attempted(set);
    sqlx::query(
        "INSERT INTO sets (id, workout_id, num, exercise_id, reps, weight, date_ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             workout_id = excluded.workout_id,
             num = excluded.num,
             exercise_id = excluded.exercise_id,
             reps = excluded.reps,
             weight = excluded.weight,
             date_ts = excluded.date_ts
         ON CONFLICT(workout_id, exercise_id, num) DO UPDATE SET
             id = excluded.id,
             reps = excluded.reps,
             weight = excluded.weight,
             date_ts = excluded.date_ts",
    )
    .bind(&set.id)
    .bind(&set.workout_id)
    .bind(set.num as i64)
    .bind(&set.exercise_id)
    .bind(set.reps as i64)
    .bind(set.weight)
    .bind(set.date.as_ref().map(to_epoch))
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::classify(e, "sets", &attempted))?;
    debug!("Set {} of workout {} saved", set.num, show(set.workout_id.as_ref()));
    Ok(())
}

/// Inserts a set, or corrects the stored one.
///
/// A row with the same id is overwritten entirely. A different id with the
/// same (workout, exercise, num) is a correction: the row takes the new id
/// and its reps, weight and date are replaced in place. A set whose workout is not stored fails with
/// `MissingParent`.
pub async fn upsert_set<'a, A>(conn: A, set: &WorkoutSet) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    write_set(&mut *conn, set).await
}

/// Existence check by id; reads no columns.
pub async fn set_exists<'a, A>(conn: A, id: &str) -> StoreResult<bool>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sets WHERE id = ?1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

pub async fn get_set_by_id<'a, A>(conn: A, id: &str) -> StoreResult<WorkoutSet>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    sqlx::query_as::<_, SetRow>(
        "SELECT id, workout_id, num, exercise_id, reps, weight, date_ts FROM sets WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .map(WorkoutSet::from_row)
    .ok_or_else(|| StoreError::not_found("sets", id))
}

pub async fn get_sets_for_workout<'a, A>(conn: A, workout_id: &str) -> StoreResult<Vec<WorkoutSet>>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let rows = sqlx::query_as::<_, SetRow>(
        "SELECT id, workout_id, num, exercise_id, reps, weight, date_ts
         FROM sets
         WHERE workout_id = ?1
         ORDER BY num ASC",
    )
    .bind(workout_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(WorkoutSet::from_row).collect())
}

// Workouts

async fn write_workout(conn: &mut SqliteConnection, workout: &Workout) -> StoreResult<()> {
    let attempted = Attempted(vec![
        ("id", workout.id.clone()),
        ("name", show(workout.name.as_ref())),
        ("date_ts", show(workout.date.as_ref().map(to_epoch))),
        ("body_part", show(workout.body_part)),
        ("duration", workout.duration.num_seconds().to_string()),
    ]);
    sqlx::query(
        "INSERT INTO workouts (id, name, date_ts, body_part, duration)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             date_ts = excluded.date_ts,
             body_part = excluded.body_part,
             duration = excluded.duration",
    )
    .bind(&workout.id)
    .bind(&workout.name)
    .bind(workout.date.as_ref().map(to_epoch))
    .bind(workout.body_part.map(|b| b.as_str()))
    .bind(workout.duration.num_seconds())
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::classify(e, "workouts", &attempted))?;
    debug!("Workout saved: {} - {}", workout, workout.id);
    Ok(())
}

/// Upserts the workout row only; its sets are left untouched.
pub async fn upsert_workout<'a, A>(conn: A, workout: &Workout) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    write_workout(&mut *conn, workout).await
}

/// Writes a workout and all its sets in one transaction. Stored sets of the
/// workout are cleared first, so the rows end up matching `content` exactly;
/// sets are then written in ascending `num` per exercise, then the workout row.
pub async fn persist_workout<'a, A>(conn: A, workout: &Workout) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut tx = conn.begin().await?;
    let cleared = sqlx::query("DELETE FROM sets WHERE workout_id = ?1")
        .bind(&workout.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if cleared > 0 {
        debug!("Cleared {} stored sets of workout {}", cleared, workout.id);
    }
    for group in workout.content.values() {
        let mut ordered: Vec<&WorkoutSet> = group.iter().collect();
        ordered.sort_by_key(|s| s.num);
        for set in ordered {
            write_set(&mut *tx, set).await?;
        }
    }
    write_workout(&mut *tx, workout).await?;

    let attempted = Attempted(vec![("workout_id", workout.id.clone())]);
    tx.commit()
        .await
        .map_err(|e| StoreError::classify(e, "sets", &attempted))?;
    debug!(
        "Workout {} persisted with {} sets",
        workout.id,
        workout.set_count()
    );
    Ok(())
}

pub async fn workout_exists<'a, A>(conn: A, id: &str) -> StoreResult<bool>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workouts WHERE id = ?1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

async fn assemble_workout(conn: &mut SqliteConnection, row: WorkoutRow) -> StoreResult<Workout> {
    let sets = get_sets_for_workout(&mut *conn, &row.id).await?;

    let mut names: HashMap<String, String> = HashMap::new();
    for exercise_id in sets.iter().filter_map(|s| s.exercise_id.as_deref()) {
        if names.contains_key(exercise_id) {
            continue;
        }
        let exercise = get_exercise_by_id(&mut *conn, exercise_id).await?;
        names.insert(exercise.id.clone(), exercise.display_name().to_string());
    }

    Ok(Workout::from_row(row).with_sets(sets, &names))
}

/// Rebuilds a workout with its sets grouped by exercise name.
pub async fn get_workout_by_id<'a, A>(conn: A, id: &str) -> StoreResult<Workout>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let row = sqlx::query_as::<_, WorkoutRow>(
        "SELECT id, name, date_ts, body_part, duration FROM workouts WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("workouts", id))?;
    assemble_workout(&mut *conn, row).await
}

/// All stored workouts, newest first.
pub async fn list_workouts<'a, A>(conn: A) -> StoreResult<Vec<Workout>>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let rows = sqlx::query_as::<_, WorkoutRow>(
        "SELECT id, name, date_ts, body_part, duration FROM workouts ORDER BY date_ts DESC",
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut workouts = Vec::with_capacity(rows.len());
    for row in rows {
        workouts.push(assemble_workout(&mut *conn, row).await?);
    }
    Ok(workouts)
}

// Sync metadata

pub async fn record_sync<'a, A>(conn: A, table_name: &str, at: DateTime<Utc>) -> StoreResult<()>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    sqlx::query(
        "INSERT INTO sync_meta (table_name, last_update)
         VALUES (?1, ?2)
         ON CONFLICT(table_name) DO UPDATE SET last_update = excluded.last_update",
    )
    .bind(table_name)
    .bind(to_epoch(&at))
    .execute(&mut *conn)
    .await?;
    debug!("Sync stamp for {} set to {}", table_name, at);
    Ok(())
}

/// `None` means the table was never synced.
pub async fn read_last_sync<'a, A>(conn: A, table_name: &str) -> StoreResult<Option<DateTime<Utc>>>
where
    A: Acquire<'a, Database = Sqlite>,
{
    let mut conn = conn.acquire().await?;
    let row = sqlx::query_as::<_, SyncMetaRow>(
        "SELECT table_name, last_update FROM sync_meta WHERE table_name = ?1",
    )
    .bind(table_name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| from_epoch(r.last_update)))
}
