//! Reconciliation between the local store and the remote workout log.
//!
//! Reads are local-first: a record is fetched from the remote only when the
//! store does not have it (or when a refresh is asked for), and whatever is
//! fetched is written back before it is returned. Remote content always wins
//! over the local copy.

mod catalog;
mod workout;

use log::{info, warn};
use sqlx::SqlitePool;

use crate::error::SyncError;
use crate::notion::{NotionInterface, Sort};

pub const EXERCISES_TABLE: &str = "exercises";
pub const MUSCLE_GROUP_TABLE: &str = "muscle_group";

/// A single record that could not be synced. The run carried on without it.
#[derive(Debug)]
pub struct RecordFailure {
    pub id: String,
    pub error: SyncError,
}

impl RecordFailure {
    pub fn is_fatal(&self) -> bool {
        self.error.is_fatal()
    }
}

#[derive(Debug, Default)]
pub struct CatalogReport {
    /// The remote catalog was not edited since the last sync.
    pub skipped: bool,
    pub exercises: usize,
    pub muscle_groups: usize,
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub catalog: CatalogReport,
    /// Workouts already stored, served without remote calls.
    pub cached: Vec<String>,
    /// Workouts parsed from the remote and written to the store.
    pub imported: Vec<String>,
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    pub fn has_fatal(&self) -> bool {
        self.failures
            .iter()
            .chain(self.catalog.failures.iter())
            .any(RecordFailure::is_fatal)
    }

    pub fn log_summary(&self) {
        info!(
            "Batch done: {} cached, {} imported, {} failed (catalog: {})",
            self.cached.len(),
            self.imported.len(),
            self.failures.len(),
            if self.catalog.skipped {
                "unchanged".to_string()
            } else {
                format!(
                    "{} exercises, {} muscle groups, {} failed",
                    self.catalog.exercises,
                    self.catalog.muscle_groups,
                    self.catalog.failures.len()
                )
            }
        );
    }
}

pub struct Reconciler {
    pool: SqlitePool,
    notion: NotionInterface,
    exercises_db: String,
    workouts_db: String,
}

impl Reconciler {
    pub fn new(
        pool: SqlitePool,
        notion: NotionInterface,
        exercises_db: impl Into<String>,
        workouts_db: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            notion,
            exercises_db: exercises_db.into(),
            workouts_db: workouts_db.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn notion(&self) -> &NotionInterface {
        &self.notion
    }

    /// Syncs the catalog, then walks the workout log newest-edit first and
    /// makes sure every listed workout is stored.
    ///
    /// Per-workout failures are collected in the report; only a failure to
    /// reach the catalog stamp or the listing itself aborts the batch.
    pub async fn reconcile_batch(
        &self,
        limit: Option<usize>,
        refresh: bool,
    ) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport {
            catalog: self.sync_catalog().await?,
            ..BatchReport::default()
        };

        let mut cursor = self
            .notion
            .query(&self.workouts_db, Some(Sort::LastEditedDescending));
        let mut seen = 0usize;
        while limit.is_none_or(|limit| seen < limit) {
            let Some(page) = cursor.next().await? else {
                break;
            };
            seen += 1;

            match self.reconcile_listed(&page, refresh).await {
                Ok(true) => report.imported.push(page.id),
                Ok(false) => report.cached.push(page.id),
                Err(error) => {
                    warn!("Workout {} skipped: {}", page.id, error);
                    report.failures.push(RecordFailure { id: page.id, error });
                }
            }
        }

        report.log_summary();
        Ok(report)
    }
}
