//! Catalog bootstrap from a coordinate mapping file
//!
//! The seed file is a JSON object of `{landmark_name: {lat, lon}}` entries.
//! Seeding replaces the catalog wholesale so repeated bootstraps don't
//! accumulate duplicates.

use crate::db::landmarks;
use crate::models::{normalize_name, Landmark};
use crate::{Error, Result};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SeedCoordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Load the seed mapping and replace the landmark catalog with it.
/// Returns the number of landmarks created.
pub async fn seed_catalog(pool: &SqlitePool, seed_file: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(seed_file)?;
    // BTreeMap for deterministic insertion order
    let entries: BTreeMap<String, SeedCoordinates> = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", seed_file.display(), e)))?;

    let removed = landmarks::delete_all(pool).await?;
    if removed > 0 {
        tracing::info!(removed, "Cleared existing catalog before seeding");
    }

    let mut created = 0;
    for (name, coords) in entries {
        let landmark = Landmark {
            guid: Uuid::new_v4(),
            name: normalize_name(&name),
            latitude: coords.lat,
            longitude: coords.lon,
            summary: None,
            external_id: None,
            created_at: Utc::now(),
        };
        landmarks::insert(pool, &landmark).await?;
        created += 1;
    }

    tracing::info!(created, "Seeded landmark catalog");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use std::io::Write;

    #[tokio::test]
    async fn test_seed_replaces_catalog() {
        let pool = test_pool().await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "eiffel_tower": {{"lat": 48.8584, "lon": 2.2945}},
                "Big Ben": {{"lat": 51.5007, "lon": -0.1246}}
            }}"#
        )
        .unwrap();
        file.flush().unwrap();

        let created = seed_catalog(&pool, file.path()).await.unwrap();
        assert_eq!(created, 2);

        // Names are normalized on the way in
        let big_ben = landmarks::get_by_name(&pool, "big_ben").await.unwrap().unwrap();
        assert_eq!(big_ben.latitude, 51.5007);

        // Re-seeding does not accumulate
        let created = seed_catalog(&pool, file.path()).await.unwrap();
        assert_eq!(created, 2);
        assert_eq!(landmarks::count(&pool).await.unwrap(), 2);
    }
}
