use log::{debug, info, warn};
use std::collections::HashMap;

use super::{CatalogReport, EXERCISES_TABLE, MUSCLE_GROUP_TABLE, RecordFailure, Reconciler};
use crate::db::operations::{read_last_sync, record_sync, upsert_exercise, upsert_muscle_groups};
use crate::entity::{Exercise, MuscleGroup};
use crate::error::SyncError;
use crate::notion::{Page, muscle_group_ids};

impl Reconciler {
    /// Brings the exercise catalog up to date.
    ///
    /// Costs one remote call when the catalog was not edited since the last
    /// successful sync. Otherwise every catalog page is parsed and upserted;
    /// a page that fails is logged and skipped, and the sync stamps are then
    /// left alone so the next run tries again.
    pub async fn sync_catalog(&self) -> Result<CatalogReport, SyncError> {
        let remote = self.notion.catalog_last_modified(&self.exercises_db).await?;
        let local = read_last_sync(&self.pool, EXERCISES_TABLE).await?;
        if local.is_some_and(|local| local >= remote) {
            info!(
                "Exercise catalog unchanged since {} (remote edit {}), skipping",
                local.map(|l| l.to_rfc3339()).unwrap_or_default(),
                remote
            );
            return Ok(CatalogReport {
                skipped: true,
                ..CatalogReport::default()
            });
        }

        let mut report = CatalogReport::default();
        let mut groups: HashMap<String, MuscleGroup> = HashMap::new();
        let mut cursor = self.notion.query(&self.exercises_db, None);
        while let Some(page) = cursor.next().await? {
            match self.sync_exercise_page(&page, &mut groups).await {
                Ok(exercise) => {
                    debug!("Catalog exercise synced: {}", exercise);
                    report.exercises += 1;
                }
                Err(error) => {
                    warn!("Catalog page {} skipped: {}", page.id, error);
                    report.failures.push(RecordFailure { id: page.id, error });
                }
            }
        }
        report.muscle_groups = groups.len();

        // Remote edit time, not the local clock.
        if report.failures.is_empty() {
            record_sync(&self.pool, EXERCISES_TABLE, remote).await?;
            record_sync(&self.pool, MUSCLE_GROUP_TABLE, remote).await?;
        }
        info!(
            "Exercise catalog synced: {} exercises, {} muscle groups, {} failed",
            report.exercises,
            report.muscle_groups,
            report.failures.len()
        );
        Ok(report)
    }

    async fn sync_exercise_page(
        &self,
        page: &Page,
        cache: &mut HashMap<String, MuscleGroup>,
    ) -> Result<Exercise, SyncError> {
        let groups = self.resolve_muscle_groups(page, cache).await?;
        upsert_muscle_groups(&self.pool, &groups).await?;
        let exercise = Exercise::from_remote_payload(page, groups);
        upsert_exercise(&self.pool, &exercise).await?;
        Ok(exercise)
    }

    /// Resolves the muscle-group pages an exercise links to, fetching each
    /// group at most once per `cache`.
    pub(super) async fn resolve_muscle_groups(
        &self,
        page: &Page,
        cache: &mut HashMap<String, MuscleGroup>,
    ) -> Result<Vec<MuscleGroup>, SyncError> {
        let mut groups = Vec::new();
        for id in muscle_group_ids(page) {
            if let Some(group) = cache.get(&id) {
                groups.push(group.clone());
                continue;
            }
            let group_page = self.notion.retrieve_page(&id).await?;
            let group = MuscleGroup::from_remote_payload(&group_page);
            cache.insert(id, group.clone());
            groups.push(group);
        }
        Ok(groups)
    }
}
