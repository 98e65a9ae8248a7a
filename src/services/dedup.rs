//! Corpus deduplication via perceptual hashing
//!
//! Average hash: downsample to 8x8 luma, threshold each pixel against the
//! mean, pack into 64 bits. Robust to re-encoding, which is why it beats a
//! content hash for scraped images. Keep-first policy over a sorted listing
//! so "first seen" is stable across platforms.
//!
//! This is a hard delete with no undo; callers are expected to back the
//! corpus up first.

use crate::db::images as image_rows;
use crate::Result;
use image::imageops::FilterType;
use image::DynamicImage;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;

/// 64-bit average perceptual hash
pub fn average_hash(img: &DynamicImage) -> u64 {
    let small = img.resize_exact(8, 8, FilterType::Triangle).to_luma8();

    let mean: u32 = small.pixels().map(|p| u32::from(p.0[0])).sum::<u32>() / 64;

    let mut hash = 0u64;
    for (i, pixel) in small.pixels().enumerate() {
        if u32::from(pixel.0[0]) > mean {
            hash |= 1 << i;
        }
    }
    hash
}

/// Remove perceptually-identical images from a folder, keeping the first
/// file observed with each hash. Returns the removed filenames. Files that
/// don't decode as images are skipped, not deleted.
pub fn dedupe_folder(folder: &Path) -> Result<Vec<String>> {
    let mut filenames: Vec<String> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    // Directory order is platform-defined; sort so first-seen is deterministic
    filenames.sort();

    let mut seen: HashMap<u64, String> = HashMap::new();
    let mut removed = Vec::new();

    for filename in filenames {
        let path = folder.join(&filename);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable file; skipping");
                continue;
            }
        };

        let decoded = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(_) => {
                tracing::debug!(path = %path.display(), "Not a decodable image; skipping");
                continue;
            }
        };

        let hash = average_hash(&decoded);
        match seen.get(&hash) {
            Some(original) => {
                tracing::debug!(
                    duplicate = %filename,
                    original = %original,
                    "Removing perceptual duplicate"
                );
                std::fs::remove_file(&path)?;
                removed.push(filename);
            }
            None => {
                seen.insert(hash, filename);
            }
        }
    }

    Ok(removed)
}

/// Folder pass plus provenance cleanup for the removed files
pub struct Deduplicator {
    pool: Option<SqlitePool>,
}

impl Deduplicator {
    pub fn new(pool: Option<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Deduplicate one landmark's folder. Returns the number of files
    /// removed.
    pub async fn run(&self, landmark_name: &str, folder: &Path) -> Result<usize> {
        let removed = dedupe_folder(folder)?;

        if let Some(pool) = &self.pool {
            for filename in &removed {
                let relative_path = format!("{}/{}", landmark_name, filename);
                if let Err(e) = image_rows::delete_by_relative_path(pool, &relative_path).await {
                    tracing::warn!(path = %relative_path, error = %e, "Failed to remove image row");
                }
            }
        }

        tracing::info!(
            landmark = %landmark_name,
            removed = removed.len(),
            "Deduplication finished"
        );
        Ok(removed.len())
    }
}
