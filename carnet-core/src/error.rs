use thiserror::Error;

use crate::db::StoreError;
use crate::notion::{NotionError, ParseError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] NotionError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyncError {
    /// Errors with no fallback: a remote that kept failing after retries, or
    /// a set whose workout does not exist.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_transient(),
            SyncError::Store(StoreError::MissingParent { .. }) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_not_found(),
            SyncError::Remote(e) => e.is_not_found(),
            SyncError::Parse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Attempted;

    #[test]
    fn fatal_classes() {
        let transient = SyncError::from(NotionError::Transient {
            endpoint: "retrieve_page".into(),
            reason: "timeout".into(),
        });
        assert!(transient.is_fatal());

        let orphan = SyncError::from(StoreError::MissingParent {
            table: "sets",
            attempted: Attempted::default(),
        });
        assert!(orphan.is_fatal());

        let malformed = SyncError::from(ParseError::Malformed {
            page_id: "s1".into(),
            path: "Reps.number".into(),
            reason: "missing".into(),
        });
        assert!(!malformed.is_fatal());
        assert!(!SyncError::from(StoreError::not_found("workouts", "w1")).is_fatal());
    }
}
