//! Acquired training images

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an image entered the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageSource {
    /// Supplied by an operator through the bulk-upload path
    Upload,
    /// Collected by the image acquirer (URL or keyword search mode)
    Scraped,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Upload => "UPLOAD",
            ImageSource::Scraped => "SCRAPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPLOAD" => Some(ImageSource::Upload),
            "SCRAPED" => Some(ImageSource::Scraped),
            _ => None,
        }
    }
}

/// One acquired or uploaded image, exclusively owned by its landmark.
///
/// Rows are never mutated; the corpus deduplicator is the only component
/// that removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkImage {
    pub guid: Uuid,
    /// Owning landmark's catalog key
    pub landmark_name: String,
    /// Path relative to the data root, `<landmark_name>/<index>.jpg`
    pub relative_path: String,
    pub source: ImageSource,
    pub created_at: DateTime<Utc>,
}

impl LandmarkImage {
    pub fn new(landmark_name: String, relative_path: String, source: ImageSource) -> Self {
        Self {
            guid: Uuid::new_v4(),
            landmark_name,
            relative_path,
            source,
            created_at: Utc::now(),
        }
    }
}
