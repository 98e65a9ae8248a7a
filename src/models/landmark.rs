//! Landmark catalog entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Canonical catalog entity for a real-world point of interest.
///
/// `name` is the unique, normalized lower-snake-case key and is immutable
/// once created. Coordinates are set exactly once at creation; later
/// resolution attempts never overwrite them. The only permitted mutation is
/// attaching a summary where none exists (or through the explicit
/// refresh-summary operation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landmark {
    pub guid: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub summary: Option<String>,
    /// Knowledge-base entity identifier, when resolution supplied one
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Landmark {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Transient resolver output, consumed once by the enrichment orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    pub coordinates: Coordinates,
    pub external_id: String,
}

/// Normalize a free-text landmark name into its catalog key.
///
/// "Eiffel Tower" and "eiffel  tower" both map to "eiffel_tower".
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Catalog key back to a spaced, lowercased search query
/// ("pyramids_of_giza" -> "pyramids of giza").
pub fn name_to_query(name: &str) -> String {
    name.replace('_', " ").to_lowercase()
}
