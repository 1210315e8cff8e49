use log::{debug, info, warn};
use std::collections::HashMap;

use super::Reconciler;
use crate::db::operations::{
    exercise_exists, get_exercise_by_id, get_set_by_id, get_workout_by_id, persist_workout,
    set_exists, upsert_exercise, upsert_muscle_groups, workout_exists,
};
use crate::entity::{Exercise, Workout, WorkoutSet};
use crate::error::SyncError;
use crate::notion::{Page, workout_set_ids};

impl Reconciler {
    /// Local store first; on a miss the workout page is fetched, parsed with
    /// its sets, persisted and returned.
    pub async fn workout_by_id(&self, id: &str) -> Result<Workout, SyncError> {
        match get_workout_by_id(&self.pool, id).await {
            Ok(workout) => {
                debug!("Workout {} served from the local store", id);
                Ok(workout)
            }
            Err(e) if e.is_not_found() => {
                info!("Workout {} not stored locally, fetching it", id);
                let page = self.notion.retrieve_page(id).await?;
                self.import_workout(&page, false).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-reads a workout and all its sets from the remote and overwrites
    /// the local rows.
    pub async fn refresh_workout(&self, id: &str) -> Result<Workout, SyncError> {
        let page = self.notion.retrieve_page(id).await?;
        self.import_workout(&page, true).await
    }

    /// Builds a full workout from its page. Each set is taken from the store
    /// when a row with its id exists, unless `refresh` is set; the others
    /// are fetched and parsed. Nothing is written except exercises the
    /// catalog does not know yet.
    pub async fn parse_workout(&self, page: &Page, refresh: bool) -> Result<Workout, SyncError> {
        let header = Workout::from_remote_payload(page);
        let set_ids = workout_set_ids(page);

        let mut sets = Vec::with_capacity(set_ids.len());
        for set_id in &set_ids {
            sets.push(self.resolve_set(set_id, &header, refresh).await?);
        }

        let names = self.exercise_names(&sets).await?;
        Ok(header.with_sets(sets, &names))
    }

    /// `Ok(true)` when the workout had to be imported.
    pub(super) async fn reconcile_listed(&self, page: &Page, refresh: bool) -> Result<bool, SyncError> {
        if !refresh && workout_exists(&self.pool, &page.id).await? {
            debug!("Workout {} already stored", page.id);
            return Ok(false);
        }
        self.import_workout(page, refresh).await?;
        Ok(true)
    }

    async fn import_workout(&self, page: &Page, refresh: bool) -> Result<Workout, SyncError> {
        let workout = self.parse_workout(page, refresh).await?;
        persist_workout(&self.pool, &workout).await?;
        info!(
            "Workout {} imported with {} sets",
            workout,
            workout.set_count()
        );
        Ok(workout)
    }

    async fn resolve_set(
        &self,
        set_id: &str,
        workout: &Workout,
        refresh: bool,
    ) -> Result<WorkoutSet, SyncError> {
        if !refresh && set_exists(&self.pool, set_id).await? {
            debug!("Set {} found locally", set_id);
            let set = get_set_by_id(&self.pool, set_id).await?;
            return Ok(attach(set, workout));
        }

        let page = self.notion.retrieve_page(set_id).await?;
        let set = attach(WorkoutSet::from_remote_payload(&page)?, workout);
        if let Some(exercise_id) = set.exercise_id.as_deref() {
            self.ensure_exercise(exercise_id).await?;
        }
        Ok(set)
    }

    /// Fetches and stores an exercise the local catalog does not have yet.
    async fn ensure_exercise(&self, id: &str) -> Result<(), SyncError> {
        if exercise_exists(&self.pool, id).await? {
            return Ok(());
        }
        info!("Exercise {} missing from the local catalog, fetching it", id);
        let page = self.notion.retrieve_page(id).await?;
        let groups = self.resolve_muscle_groups(&page, &mut HashMap::new()).await?;
        upsert_muscle_groups(&self.pool, &groups).await?;
        upsert_exercise(&self.pool, &Exercise::from_remote_payload(&page, groups)).await?;
        Ok(())
    }

    async fn exercise_names(&self, sets: &[WorkoutSet]) -> Result<HashMap<String, String>, SyncError> {
        let mut names = HashMap::new();
        for id in sets.iter().filter_map(|s| s.exercise_id.as_deref()) {
            if names.contains_key(id) {
                continue;
            }
            let exercise = get_exercise_by_id(&self.pool, id).await?;
            names.insert(id.to_string(), exercise.display_name().to_string());
        }
        Ok(names)
    }
}

/// Binds a set to the workout listing it; the workout's relation wins over
/// whatever the set itself points at.
fn attach(mut set: WorkoutSet, workout: &Workout) -> WorkoutSet {
    if let Some(other) = set.workout_id.as_deref().filter(|w| *w != workout.id) {
        warn!(
            "Set {} points at workout {}, attaching it to {}",
            set.id, other, workout.id
        );
    }
    set.workout_id = Some(workout.id.clone());
    if set.date.is_none() {
        set.date = workout.date;
    }
    set
}
