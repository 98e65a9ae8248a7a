//! Landmark catalog persistence

use crate::models::Landmark;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn landmark_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Landmark> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;

    let created_str: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_str)
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?
        .with_timezone(&Utc);

    Ok(Landmark {
        guid,
        name: row.get("name"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        summary: row.get("summary"),
        external_id: row.get("external_id"),
        created_at,
    })
}

/// Insert a new landmark. A UNIQUE violation on `name` is surfaced to the
/// caller unmapped so the orchestrator can resolve the race by re-reading.
pub async fn insert(pool: &SqlitePool, landmark: &Landmark) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO landmarks (guid, name, latitude, longitude, summary, external_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(landmark.guid.to_string())
    .bind(&landmark.name)
    .bind(landmark.latitude)
    .bind(landmark.longitude)
    .bind(&landmark.summary)
    .bind(&landmark.external_id)
    .bind(landmark.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a landmark by its normalized name
pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Landmark>> {
    let row = sqlx::query("SELECT * FROM landmarks WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(landmark_from_row(&row)?)),
        None => Ok(None),
    }
}

/// All landmarks, ordered by name
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Landmark>> {
    let rows = sqlx::query("SELECT * FROM landmarks ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(landmark_from_row).collect()
}

/// Attach a summary only where none exists. Returns true if a row changed.
///
/// Summaries are set once at creation; this is the path for landmarks
/// created before a summary was available.
pub async fn set_summary_if_absent(
    pool: &SqlitePool,
    name: &str,
    summary: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE landmarks SET summary = ? WHERE name = ? AND summary IS NULL",
    )
    .bind(summary)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Explicit summary refresh. Overwrites unconditionally; only the dedicated
/// refresh operation calls this.
pub async fn overwrite_summary(pool: &SqlitePool, name: &str, summary: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE landmarks SET summary = ? WHERE name = ?")
        .bind(summary)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM landmarks")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Remove every landmark (catalog re-seed)
pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM landmarks").execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{is_unique_violation, test_pool};

    fn sample(name: &str) -> Landmark {
        Landmark {
            guid: Uuid::new_v4(),
            name: name.to_string(),
            latitude: 48.8584,
            longitude: 2.2945,
            summary: None,
            external_id: Some("Q243".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = test_pool().await;
        let landmark = sample("eiffel_tower");

        insert(&pool, &landmark).await.unwrap();

        let loaded = get_by_name(&pool, "eiffel_tower").await.unwrap().unwrap();
        assert_eq!(loaded.guid, landmark.guid);
        assert_eq!(loaded.latitude, 48.8584);
        assert_eq!(loaded.external_id.as_deref(), Some("Q243"));

        assert!(get_by_name(&pool, "big_ben").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let pool = test_pool().await;
        insert(&pool, &sample("colosseum")).await.unwrap();

        let err = insert(&pool, &sample("colosseum")).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_set_summary_if_absent() {
        let pool = test_pool().await;
        insert(&pool, &sample("taj_mahal")).await.unwrap();

        assert!(set_summary_if_absent(&pool, "taj_mahal", "first").await.unwrap());
        // Second attempt must not overwrite
        assert!(!set_summary_if_absent(&pool, "taj_mahal", "second").await.unwrap());

        let loaded = get_by_name(&pool, "taj_mahal").await.unwrap().unwrap();
        assert_eq!(loaded.summary.as_deref(), Some("first"));

        // The explicit refresh path does overwrite
        assert!(overwrite_summary(&pool, "taj_mahal", "second").await.unwrap());
        let loaded = get_by_name(&pool, "taj_mahal").await.unwrap().unwrap();
        assert_eq!(loaded.summary.as_deref(), Some("second"));
    }
}
