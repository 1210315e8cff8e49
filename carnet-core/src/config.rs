use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

use crate::db;
use crate::notion::{NotionInterface, RetryPolicy};
use crate::reconcile::Reconciler;

pub const DEFAULT_DB_PATH: &str = "carnet.db";
pub const DEFAULT_EXERCISES_DB: &str = "026420f9e2b44f2bb72560c9775ac355";
pub const DEFAULT_WORKOUTS_DB: &str = "1e522945c40e4c418d5854942b5d4910";

#[derive(Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub notion_token: String,
    pub exercises_db: String,
    pub workouts_db: String,
    pub retry: RetryPolicy,
    /// Maximum number of workouts reconciled per batch; `None` walks the
    /// whole log.
    pub batch_limit: Option<usize>,
}

impl Config {
    pub fn new(notion_token: impl Into<String>) -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            notion_token: notion_token.into(),
            exercises_db: DEFAULT_EXERCISES_DB.to_string(),
            workouts_db: DEFAULT_WORKOUTS_DB.to_string(),
            retry: RetryPolicy::default(),
            batch_limit: None,
        }
    }

    /// Opens the store and the remote client and wires them together.
    pub async fn reconciler(&self) -> Result<Reconciler> {
        let pool = db::open(&self.db_path).await?;
        let notion = NotionInterface::new_http(&self.notion_token)?.with_retry(self.retry);
        Ok(Reconciler::new(
            pool,
            notion,
            self.exercises_db.clone(),
            self.workouts_db.clone(),
        ))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("notion_token", &"<redacted>")
            .field("exercises_db", &self.exercises_db)
            .field("workouts_db", &self.workouts_db)
            .field("retry", &self.retry)
            .field("batch_limit", &self.batch_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_workout_log() {
        let config = Config::new("secret_abc");
        assert_eq!(config.exercises_db, DEFAULT_EXERCISES_DB);
        assert_eq!(config.workouts_db, DEFAULT_WORKOUTS_DB);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!format!("{:?}", config).contains("secret_abc"));
    }
}
