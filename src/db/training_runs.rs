//! Training run persistence
//!
//! Runs are append-only history. Finalization queries guard on
//! `status = 'processing'` so a terminal run can never transition again.

use crate::models::{RunStatus, TrainingRun};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TrainingRun> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;

    let status_str: String = row.get("status");
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("Unknown run status: {}", status_str)))?;

    let started_str: String = row.get("started_at");
    let started_at = DateTime::parse_from_rfc3339(&started_str)
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?
        .with_timezone(&Utc);

    let finished_at = match row.get::<Option<String>, _>("finished_at") {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    let epochs: i64 = row.get("epochs");

    Ok(TrainingRun {
        guid,
        model_name: row.get("model_name"),
        epochs: epochs as u32,
        image_count: row.get("image_count"),
        accuracy: row.get("accuracy"),
        loss: row.get("loss"),
        status,
        message: row.get("message"),
        started_at,
        finished_at,
    })
}

/// Record a run in the `processing` state, before any work happens
pub async fn insert(pool: &SqlitePool, run: &TrainingRun) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO training_runs
            (guid, model_name, epochs, image_count, accuracy, loss, status, message, started_at, finished_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.guid.to_string())
    .bind(&run.model_name)
    .bind(run.epochs as i64)
    .bind(run.image_count)
    .bind(run.accuracy)
    .bind(run.loss)
    .bind(run.status.as_str())
    .bind(&run.message)
    .bind(run.started_at.to_rfc3339())
    .bind(run.finished_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, guid: Uuid) -> Result<Option<TrainingRun>> {
    let row = sqlx::query("SELECT * FROM training_runs WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(run_from_row(&row)?)),
        None => Ok(None),
    }
}

/// Transition `processing -> failed` with a descriptive message
pub async fn mark_failed(pool: &SqlitePool, guid: Uuid, message: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE training_runs
        SET status = 'failed', message = ?, finished_at = ?
        WHERE guid = ? AND status = 'processing'
        "#,
    )
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Internal(format!(
            "Run {} is not in the processing state",
            guid
        )));
    }
    Ok(())
}

/// Transition `processing -> success` with final metrics
pub async fn mark_success(
    pool: &SqlitePool,
    guid: Uuid,
    image_count: i64,
    accuracy: f64,
    loss: f64,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE training_runs
        SET status = 'success', image_count = ?, accuracy = ?, loss = ?, finished_at = ?
        WHERE guid = ? AND status = 'processing'
        "#,
    )
    .bind(image_count)
    .bind(accuracy)
    .bind(loss)
    .bind(Utc::now().to_rfc3339())
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Internal(format!(
            "Run {} is not in the processing state",
            guid
        )));
    }
    Ok(())
}

/// Run history, newest first
pub async fn history(pool: &SqlitePool, limit: i64) -> Result<Vec<TrainingRun>> {
    let rows = sqlx::query("SELECT * FROM training_runs ORDER BY started_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(run_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_lifecycle_success() {
        let pool = test_pool().await;
        let run = TrainingRun::begin("landmark_resnet18".into(), 5);
        insert(&pool, &run).await.unwrap();

        mark_success(&pool, run.guid, 120, 0.92, 0.31).await.unwrap();

        let loaded = get(&pool, run.guid).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Success);
        assert_eq!(loaded.image_count, Some(120));
        assert_eq!(loaded.accuracy, Some(0.92));
        assert!(loaded.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_runs_never_reopen() {
        let pool = test_pool().await;
        let run = TrainingRun::begin("landmark_resnet18".into(), 5);
        insert(&pool, &run).await.unwrap();

        mark_failed(&pool, run.guid, "insufficient data").await.unwrap();

        // Both transitions out of a terminal state must be rejected
        assert!(mark_success(&pool, run.guid, 1, 0.5, 0.5).await.is_err());
        assert!(mark_failed(&pool, run.guid, "again").await.is_err());

        let loaded = get(&pool, run.guid).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.message.as_deref(), Some("insufficient data"));
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let pool = test_pool().await;

        let mut older = TrainingRun::begin("landmark_resnet18".into(), 5);
        older.started_at = Utc::now() - chrono::Duration::hours(1);
        insert(&pool, &older).await.unwrap();

        let newer = TrainingRun::begin("landmark_resnet18".into(), 5);
        insert(&pool, &newer).await.unwrap();

        let runs = history(&pool, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].guid, newer.guid);
        assert_eq!(runs[1].guid, older.guid);
    }
}
