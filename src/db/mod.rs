//! Database access for the landmark pipeline
//!
//! SQLite via sqlx. Schema initialization is idempotent so the same
//! entry point serves fresh installs and restarts.

pub mod images;
pub mod landmarks;
pub mod seed;
pub mod training_runs;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool, creating the file and tables on
/// first use.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create pipeline tables if they don't exist.
///
/// The UNIQUE constraint on `landmarks.name` is the last line of defense
/// against a duplicate-create race in concurrent `get_or_create` calls.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS landmarks (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            summary TEXT,
            external_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS landmark_images (
            guid TEXT PRIMARY KEY,
            landmark_name TEXT NOT NULL,
            relative_path TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_runs (
            guid TEXT PRIMARY KEY,
            model_name TEXT NOT NULL,
            epochs INTEGER NOT NULL,
            image_count INTEGER,
            accuracy REAL,
            loss REAL,
            status TEXT NOT NULL,
            message TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (landmarks, landmark_images, training_runs)");

    Ok(())
}

/// True when a sqlx error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation()
    )
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_tables(&pool).await.expect("Failed to init tables");
    pool
}
