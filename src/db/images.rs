//! Landmark image provenance rows

use crate::models::{ImageSource, LandmarkImage};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn image_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LandmarkImage> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;

    let source_str: String = row.get("source");
    let source = ImageSource::parse(&source_str)
        .ok_or_else(|| Error::Internal(format!("Unknown image source: {}", source_str)))?;

    let created_str: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_str)
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?
        .with_timezone(&Utc);

    Ok(LandmarkImage {
        guid,
        landmark_name: row.get("landmark_name"),
        relative_path: row.get("relative_path"),
        source,
        created_at,
    })
}

pub async fn insert(pool: &SqlitePool, img: &LandmarkImage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO landmark_images (guid, landmark_name, relative_path, source, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(img.guid.to_string())
    .bind(&img.landmark_name)
    .bind(&img.relative_path)
    .bind(img.source.as_str())
    .bind(img.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a batch atomically (bulk-upload path)
pub async fn bulk_insert(pool: &SqlitePool, images: &[LandmarkImage]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for img in images {
        sqlx::query(
            r#"
            INSERT INTO landmark_images (guid, landmark_name, relative_path, source, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(img.guid.to_string())
        .bind(&img.landmark_name)
        .bind(&img.relative_path)
        .bind(img.source.as_str())
        .bind(img.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list_for_landmark(pool: &SqlitePool, landmark_name: &str) -> Result<Vec<LandmarkImage>> {
    let rows = sqlx::query(
        "SELECT * FROM landmark_images WHERE landmark_name = ? ORDER BY relative_path",
    )
    .bind(landmark_name)
    .fetch_all(pool)
    .await?;

    rows.iter().map(image_from_row).collect()
}

pub async fn count_for_landmark(pool: &SqlitePool, landmark_name: &str) -> Result<i64> {
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM landmark_images WHERE landmark_name = ?")
            .bind(landmark_name)
            .fetch_one(pool)
            .await?;
    Ok(n)
}

/// Remove the row for a deleted file. Returns true if a row existed.
pub async fn delete_by_relative_path(pool: &SqlitePool, relative_path: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM landmark_images WHERE relative_path = ?")
        .bind(relative_path)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_insert_and_list() {
        let pool = test_pool().await;

        insert(
            &pool,
            &LandmarkImage::new("big_ben".into(), "big_ben/0.jpg".into(), ImageSource::Scraped),
        )
        .await
        .unwrap();
        insert(
            &pool,
            &LandmarkImage::new("big_ben".into(), "big_ben/1.jpg".into(), ImageSource::Upload),
        )
        .await
        .unwrap();

        let images = list_for_landmark(&pool, "big_ben").await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].relative_path, "big_ben/0.jpg");
        assert_eq!(images[0].source, ImageSource::Scraped);
        assert_eq!(images[1].source, ImageSource::Upload);

        assert_eq!(count_for_landmark(&pool, "big_ben").await.unwrap(), 2);
        assert_eq!(count_for_landmark(&pool, "colosseum").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_insert_and_delete() {
        let pool = test_pool().await;

        let batch: Vec<LandmarkImage> = (0..3)
            .map(|i| {
                LandmarkImage::new(
                    "colosseum".into(),
                    format!("colosseum/{}.jpg", i),
                    ImageSource::Upload,
                )
            })
            .collect();
        bulk_insert(&pool, &batch).await.unwrap();
        assert_eq!(count_for_landmark(&pool, "colosseum").await.unwrap(), 3);

        assert!(delete_by_relative_path(&pool, "colosseum/1.jpg").await.unwrap());
        assert!(!delete_by_relative_path(&pool, "colosseum/1.jpg").await.unwrap());
        assert_eq!(count_for_landmark(&pool, "colosseum").await.unwrap(), 2);
    }
}
