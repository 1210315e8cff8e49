pub mod errors;
pub mod models;
pub mod operations;

pub use errors::{Attempted, StoreError};

use anyhow::Result;
use log::{debug, info};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

/// Opens (creating if needed) the local store and applies pending migrations.
pub async fn open(path: impl AsRef<Path>) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path.as_ref())
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000))
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;

    init_database(&pool).await?;
    Ok(pool)
}

/// A private in-memory store. The pool is pinned to one connection that never
/// expires, otherwise each connection would see its own empty database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_database(&pool).await?;
    Ok(pool)
}

pub async fn clear_all_tables(pool: &SqlitePool) -> Result<()> {
    for table in [
        "sets",
        "workouts",
        "exercise_muscle_group",
        "exercises",
        "muscle_group",
        "sync_meta",
    ] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(pool)
            .await?;
    }
    Ok(())
}

struct Migration {
    name: &'static str,
    up_sql: &'static str,
}

const MIGRATION_2025_11_02_101500_0000_SETUP_TABLES: &str =
    include_str!("../../../migrations/2025-11-02-101500-0000_setup_tables/up.sql");

const MIGRATIONS: &[Migration] = &[Migration {
    name: "2025-11-02-101500-0000_setup_tables",
    up_sql: MIGRATION_2025_11_02_101500_0000_SETUP_TABLES,
}];

async fn init_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER NOT NULL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s','now') AS INTEGER))
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn is_migration_applied(pool: &SqlitePool, migration_name: &str) -> Result<bool> {
    let result =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _migrations WHERE name = ?1")
            .bind(migration_name)
            .fetch_one(pool)
            .await?;
    Ok(result > 0)
}

fn parse_sql_statements(sql: &str) -> Vec<String> {
    sql.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("--")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Applies every migration not yet recorded in `_migrations`. Each migration
/// runs in its own transaction together with its bookkeeping row.
pub async fn init_database(pool: &SqlitePool) -> Result<()> {
    init_migrations_table(pool).await?;

    for migration in MIGRATIONS {
        if is_migration_applied(pool, migration.name).await? {
            debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        info!("Applying migration: {}", migration.name);
        let mut tx = pool.begin().await?;
        for statement in parse_sql_statements(migration.up_sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to execute migration statement in {}: {} - Error: {}",
                        migration.name,
                        statement,
                        e
                    )
                })?;
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?1)")
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Migration {} applied successfully", migration.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_skip_comments_and_blanks() {
        let sql = "-- header\nCREATE TABLE a (x INTEGER);\n\nCREATE INDEX i ON a(x)\n";
        let statements = parse_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
    }

    #[tokio::test]
    async fn migrations_are_applied_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carnet.db");

        let pool = open(&path).await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
             ('muscle_group', 'exercises', 'exercise_muscle_group', 'workouts', 'sets', 'sync_meta')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 6);
        pool.close().await;

        let reopened = open(&path).await.unwrap();
        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&reopened)
            .await
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn clearing_empties_every_table() {
        let pool = open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO sync_meta (table_name, last_update) VALUES ('exercises', 1)")
            .execute(&pool)
            .await
            .unwrap();
        clear_all_tables(&pool).await.unwrap();
        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_meta")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 0);
    }
}
