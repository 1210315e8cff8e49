use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Column/value pairs of the row an operation tried to write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attempted(pub Vec<(&'static str, String)>);

impl Attempted {
    pub fn value_of(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Attempted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(c, v)| format!("{}={}", c, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} {id} not found in the local store")]
    NotFound { table: &'static str, id: String },

    #[error("missing value for {table}.{column} (attempted {column}={value}); row {attempted}")]
    MissingData {
        table: &'static str,
        column: String,
        value: String,
        attempted: Attempted,
    },

    #[error("duplicate {table} on ({}); row {attempted}", .columns.join(", "))]
    Duplicate {
        table: &'static str,
        columns: Vec<String>,
        attempted: Attempted,
    },

    #[error("{table} row references a missing parent; row {attempted}")]
    MissingParent {
        table: &'static str,
        attempted: Attempted,
    },

    #[error("{table} row rejected by a check constraint ({detail}); row {attempted}")]
    Rejected {
        table: &'static str,
        detail: String,
        attempted: Attempted,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(table: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            table,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Maps a write failure to the taxonomy, keeping the attempted row for
    /// diagnostics. Anything that is not a constraint violation stays a
    /// plain database error.
    pub fn classify(err: sqlx::Error, table: &'static str, attempted: &Attempted) -> Self {
        let sqlx::Error::Database(db_err) = &err else {
            return StoreError::Database(err);
        };
        let message = db_err.message().to_string();
        match db_err.kind() {
            ErrorKind::NotNullViolation => {
                let column = constraint_columns(&message)
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                let value = attempted.value_of(&column).unwrap_or("NULL").to_string();
                StoreError::MissingData {
                    table,
                    column,
                    value,
                    attempted: attempted.clone(),
                }
            }
            ErrorKind::UniqueViolation => StoreError::Duplicate {
                table,
                columns: constraint_columns(&message),
                attempted: attempted.clone(),
            },
            ErrorKind::ForeignKeyViolation => StoreError::MissingParent {
                table,
                attempted: attempted.clone(),
            },
            ErrorKind::CheckViolation => StoreError::Rejected {
                table,
                detail: message,
                attempted: attempted.clone(),
            },
            _ => StoreError::Database(err),
        }
    }
}

/// Extracts column names from SQLite messages such as
/// `UNIQUE constraint failed: sets.workout_id, sets.exercise_id, sets.num`.
fn constraint_columns(message: &str) -> Vec<String> {
    let Some((_, detail)) = message.split_once(": ") else {
        return Vec::new();
    };
    detail
        .split(',')
        .map(|qualified| {
            let qualified = qualified.trim();
            qualified
                .rsplit_once('.')
                .map(|(_, column)| column)
                .unwrap_or(qualified)
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_come_from_the_constraint_message() {
        assert_eq!(
            constraint_columns("NOT NULL constraint failed: workouts.body_part"),
            vec!["body_part"]
        );
        assert_eq!(
            constraint_columns(
                "UNIQUE constraint failed: sets.workout_id, sets.exercise_id, sets.num"
            ),
            vec!["workout_id", "exercise_id", "num"]
        );
        assert!(constraint_columns("FOREIGN KEY constraint failed").is_empty());
    }

    #[test]
    fn attempted_row_is_readable() {
        let attempted = Attempted(vec![("id", "w1".into()), ("body_part", "NULL".into())]);
        assert_eq!(attempted.value_of("body_part"), Some("NULL"));
        assert_eq!(attempted.to_string(), "{id=w1, body_part=NULL}");
    }
}
