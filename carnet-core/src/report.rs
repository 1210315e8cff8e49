//! Read-only aggregates over the local store for dashboards.

use chrono::{DateTime, Datelike, Duration, IsoWeek, NaiveDate, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::{BTreeMap, HashSet};

use crate::db::StoreError;
use crate::entity::{from_epoch, to_epoch};

#[derive(Debug, Clone, PartialEq, FromRow)]
struct SummaryRow {
    id: String,
    name: Option<String>,
    date_ts: i64,
    duration: i64,
    set_count: i64,
    total_reps: i64,
    volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSummary {
    pub id: String,
    pub name: Option<String>,
    pub date: DateTime<Utc>,
    pub duration: Duration,
    pub set_count: i64,
    pub total_reps: i64,
    /// Sum of reps x weight.
    pub volume: f64,
}

impl From<SummaryRow> for WorkoutSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            date: from_epoch(row.date_ts),
            duration: Duration::seconds(row.duration),
            set_count: row.set_count,
            total_reps: row.total_reps,
            volume: row.volume,
        }
    }
}

/// One line per workout, newest first.
pub async fn workout_summaries(pool: &SqlitePool) -> Result<Vec<WorkoutSummary>, StoreError> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        "SELECT w.id, w.name, w.date_ts, w.duration,
                COUNT(s.id) AS set_count,
                CAST(COALESCE(SUM(s.reps), 0) AS INTEGER) AS total_reps,
                CAST(COALESCE(SUM(s.reps * s.weight), 0) AS REAL) AS volume
         FROM workouts AS w
         LEFT JOIN sets AS s ON s.workout_id = w.id
         GROUP BY w.id
         ORDER BY w.date_ts DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(WorkoutSummary::from).collect())
}

#[derive(Debug, Clone, PartialEq, FromRow)]
struct HistoryRow {
    set_id: String,
    workout_id: String,
    exercise: String,
    num: i64,
    reps: i64,
    weight: f64,
    date_ts: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetHistoryEntry {
    pub set_id: String,
    pub workout_id: String,
    pub exercise: String,
    pub num: i64,
    pub reps: i64,
    pub weight: f64,
    pub date: DateTime<Utc>,
}

impl SetHistoryEntry {
    pub fn volume(&self) -> f64 {
        self.reps as f64 * self.weight
    }
}

/// Every stored set with its exercise name, newest first. `exercise`
/// restricts the history to one exercise name.
pub async fn set_history(
    pool: &SqlitePool,
    exercise: Option<&str>,
) -> Result<Vec<SetHistoryEntry>, StoreError> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT s.id AS set_id, s.workout_id, e.name AS exercise, s.num, s.reps, s.weight, s.date_ts
         FROM sets AS s
         JOIN exercises AS e ON e.id = s.exercise_id
         WHERE ?1 IS NULL OR e.name = ?1
         ORDER BY s.date_ts DESC, e.name ASC, s.num ASC",
    )
    .bind(exercise)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| SetHistoryEntry {
            set_id: r.set_id,
            workout_id: r.workout_id,
            exercise: r.exercise,
            num: r.num,
            reps: r.reps,
            weight: r.weight,
            date: from_epoch(r.date_ts),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub workouts: i64,
    pub total_volume: f64,
    pub total_reps: i64,
    pub total_duration: Duration,
}

/// Totals over the workouts dated at or after `since`.
pub async fn totals_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<Totals, StoreError> {
    let since = to_epoch(&since);
    let (workouts, seconds): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), CAST(COALESCE(SUM(duration), 0) AS INTEGER)
         FROM workouts WHERE date_ts >= ?1",
    )
    .bind(since)
    .fetch_one(pool)
    .await?;
    let (total_reps, total_volume): (i64, f64) = sqlx::query_as(
        "SELECT CAST(COALESCE(SUM(s.reps), 0) AS INTEGER),
                CAST(COALESCE(SUM(s.reps * s.weight), 0) AS REAL)
         FROM sets AS s
         JOIN workouts AS w ON w.id = s.workout_id
         WHERE w.date_ts >= ?1",
    )
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(Totals {
        workouts,
        total_volume,
        total_reps,
        total_duration: Duration::seconds(seconds),
    })
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Minutes trained in the ISO week (Monday to Sunday, UTC) containing `day`.
pub async fn weekly_minutes(pool: &SqlitePool, day: NaiveDate) -> Result<i64, StoreError> {
    let start = midnight(week_start(day));
    let end = start + Duration::days(7);
    let seconds: i64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(duration), 0) AS INTEGER)
         FROM workouts WHERE date_ts >= ?1 AND date_ts < ?2",
    )
    .bind(to_epoch(&start))
    .bind(to_epoch(&end))
    .fetch_one(pool)
    .await?;
    Ok(seconds / 60)
}

/// Number of consecutive ISO weeks, counting back from the week of `today`,
/// in which every workout name in `required` was done. The current week only
/// counts once it is complete; while incomplete it neither counts nor breaks
/// the streak.
pub async fn week_streak(
    pool: &SqlitePool,
    required: &[&str],
    today: NaiveDate,
) -> Result<u32, StoreError> {
    if required.is_empty() {
        return Ok(0);
    }
    let rows: Vec<(Option<String>, i64)> = sqlx::query_as("SELECT name, date_ts FROM workouts")
        .fetch_all(pool)
        .await?;

    let mut weeks: BTreeMap<IsoWeek, HashSet<String>> = BTreeMap::new();
    for (name, date_ts) in rows {
        if let Some(name) = name {
            weeks
                .entry(from_epoch(date_ts).iso_week())
                .or_default()
                .insert(name);
        }
    }
    let complete = |week: IsoWeek| {
        weeks
            .get(&week)
            .is_some_and(|done| required.iter().all(|r| done.contains(*r)))
    };

    let mut streak = 0;
    let mut monday = week_start(today);
    if complete(today.iso_week()) {
        streak += 1;
    }
    loop {
        monday -= Duration::days(7);
        if !complete(monday.iso_week()) {
            break;
        }
        streak += 1;
    }
    Ok(streak)
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BodyPartTotal {
    pub body_part: String,
    pub reps: i64,
    pub sets: i64,
    pub volume: f64,
}

/// Reps, sets and volume since `since`, keyed by the body part of each
/// exercise's first muscle group ("Unknown" when it has none).
pub async fn body_part_totals(
    pool: &SqlitePool,
    since: DateTime<Utc>,
) -> Result<Vec<BodyPartTotal>, StoreError> {
    let rows = sqlx::query_as::<_, BodyPartTotal>(
        "SELECT COALESCE(mg.body_part, 'Unknown') AS body_part,
                CAST(COALESCE(SUM(s.reps), 0) AS INTEGER) AS reps,
                COUNT(s.id) AS sets,
                CAST(COALESCE(SUM(s.reps * s.weight), 0) AS REAL) AS volume
         FROM sets AS s
         LEFT JOIN exercise_muscle_group AS emg
             ON emg.exercise_id = s.exercise_id
             AND emg.position = (
                 SELECT MIN(position) FROM exercise_muscle_group
                 WHERE exercise_id = s.exercise_id
             )
         LEFT JOIN muscle_group AS mg ON mg.id = emg.muscle_group_id
         WHERE s.date_ts >= ?1
         GROUP BY COALESCE(mg.body_part, 'Unknown')
         ORDER BY volume DESC",
    )
    .bind(to_epoch(&since))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::operations::{persist_workout, upsert_exercise, upsert_muscle_groups};
    use crate::entity::{BodyPart, Exercise, MuscleGroup, Workout, WorkoutSet};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 18, 0, 0).unwrap()
    }

    fn workout(id: &str, name: &str, date: DateTime<Utc>, sets: &[(u32, u32, f64)]) -> Workout {
        let sets = sets
            .iter()
            .enumerate()
            .map(|(i, &(num, reps, weight))| WorkoutSet {
                id: format!("{}-s{}", id, i),
                workout_id: Some(id.into()),
                exercise_id: Some("e1".into()),
                num,
                reps,
                weight,
                date: Some(date),
            })
            .collect();
        Workout {
            name: Some(name.into()),
            body_part: Some(BodyPart::UpperBody),
            date: Some(date),
            duration: Duration::minutes(60),
            ..Workout::new(id)
        }
        .with_sets(sets, &HashMap::new())
    }

    async fn seeded() -> SqlitePool {
        let pool = open_in_memory().await.unwrap();
        let chest = MuscleGroup::new("mg1", Some("Pecs".into()), Some("Upper Body".into()));
        upsert_muscle_groups(&pool, &[chest.clone()]).await.unwrap();
        let mut bench = Exercise::new("e1", Some("Bench Press".into()));
        bench.muscle_groups = vec![chest];
        upsert_exercise(&pool, &bench).await.unwrap();

        // Wednesday 2024-01-10 and the Monday before it are the same ISO week.
        for w in [
            workout("w1", "Upper A", at(2024, 1, 8), &[(1, 5, 60.0), (2, 5, 60.0)]),
            workout("w2", "Lower A", at(2024, 1, 10), &[(1, 8, 100.0)]),
            workout("w3", "Upper A", at(2024, 1, 2), &[(1, 5, 55.0)]),
            workout("w4", "Lower A", at(2024, 1, 4), &[]),
        ] {
            persist_workout(&pool, &w).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn summaries_aggregate_sets() {
        let pool = seeded().await;
        let summaries = workout_summaries(&pool).await.unwrap();
        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["w2", "w1", "w4", "w3"]);
        let w1 = &summaries[1];
        assert_eq!(w1.set_count, 2);
        assert_eq!(w1.total_reps, 10);
        assert_eq!(w1.volume, 600.0);
        assert_eq!(summaries[2].set_count, 0);
        assert_eq!(summaries[2].volume, 0.0);
    }

    #[tokio::test]
    async fn history_filters_by_exercise() {
        let pool = seeded().await;
        let all = set_history(&pool, None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].workout_id, "w2");
        assert_eq!(all[0].volume(), 800.0);
        assert!(set_history(&pool, Some("Curl")).await.unwrap().is_empty());
        assert_eq!(set_history(&pool, Some("Bench Press")).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn totals_and_weekly_minutes() {
        let pool = seeded().await;
        let totals = totals_since(&pool, at(2024, 1, 8) - Duration::hours(1)).await.unwrap();
        assert_eq!(totals.workouts, 2);
        assert_eq!(totals.total_reps, 18);
        assert_eq!(totals.total_volume, 1400.0);
        assert_eq!(totals.total_duration, Duration::minutes(120));

        let wednesday = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(weekly_minutes(&pool, wednesday).await.unwrap(), 120);
    }

    #[tokio::test]
    async fn streak_counts_complete_weeks() {
        let pool = seeded().await;
        let required = ["Upper A", "Lower A"];
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        assert_eq!(week_streak(&pool, &required, sunday).await.unwrap(), 2);

        // Week of 2024-01-15 is still empty: ignored, not a break.
        let next_monday = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(week_streak(&pool, &required, next_monday).await.unwrap(), 2);

        let much_later = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(week_streak(&pool, &required, much_later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn body_parts_follow_the_first_muscle_group() {
        let pool = seeded().await;
        let totals = body_part_totals(&pool, at(2024, 1, 1)).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].body_part, "Upper Body");
        assert_eq!(totals[0].sets, 4);
        assert_eq!(totals[0].reps, 23);
    }
}
