//! Geo-resolver: free-text landmark name to verified coordinates
//!
//! A three-tier fuzzy-match cascade over knowledge-base search results:
//!
//! 1. exact label match
//! 2. word-containment match (label's word set is a superset of the query's)
//! 3. substring match
//!
//! Each tier is tried in full before falling through; ties within a tier go
//! to the knowledge base's own ordering. A label match only counts when the
//! entity also carries a coordinate claim. If the whole cascade misses and
//! the name has registered aliases, the cascade is retried once per alias,
//! first success wins. Network failures on individual calls are treated as
//! non-matches so the cascade and alias retry keep going.

use crate::models::{name_to_query, normalize_name, ResolutionResult};
use crate::services::knowledge_base::{EntityHit, KnowledgeBase};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fallback search names for landmarks whose catalog key doesn't match
/// their knowledge-base label.
pub fn default_aliases() -> HashMap<String, Vec<String>> {
    let mut aliases = HashMap::new();
    aliases.insert(
        "pyramids_of_giza".to_string(),
        vec![
            "Giza pyramid complex".to_string(),
            "Great Pyramid of Giza".to_string(),
        ],
    );
    aliases
}

pub struct GeoResolver {
    kb: Arc<dyn KnowledgeBase>,
    aliases: HashMap<String, Vec<String>>,
}

impl GeoResolver {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            kb,
            aliases: default_aliases(),
        }
    }

    pub fn with_aliases(kb: Arc<dyn KnowledgeBase>, aliases: HashMap<String, Vec<String>>) -> Self {
        Self { kb, aliases }
    }

    /// Resolve a landmark name to coordinates and an external id.
    /// `None` means not found; failure is a value here, never a panic.
    pub async fn resolve(&self, name: &str) -> Option<ResolutionResult> {
        let query = name_to_query(name);

        if let Some(result) = self.cascade(&query).await {
            return Some(result);
        }

        if let Some(alias_list) = self.aliases.get(&normalize_name(name)) {
            for alias in alias_list {
                tracing::info!(name = %name, alias = %alias, "Retrying resolution with alias");
                if let Some(result) = self.cascade(&name_to_query(&normalize_name(alias))).await {
                    return Some(result);
                }
            }
        }

        tracing::info!(name = %name, "No coordinates found in knowledge base");
        None
    }

    /// One full cascade over the search results for a single query
    async fn cascade(&self, query: &str) -> Option<ResolutionResult> {
        let results = match self.kb.search(query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Knowledge-base search failed");
                return None;
            }
        };

        if results.is_empty() {
            return None;
        }

        let query_words: HashSet<&str> = query.split_whitespace().collect();

        // Tier 1: exact label match
        for hit in &results {
            if hit.label.to_lowercase() == query {
                if let Some(result) = self.accept(hit).await {
                    return Some(result);
                }
            }
        }

        // Tier 2: word containment (handles suffix/prefix noise,
        // e.g. "pyramids of giza" -> "Giza pyramid complex" style labels)
        for hit in &results {
            let label_lower = hit.label.to_lowercase();
            let label_words: HashSet<&str> = label_lower.split_whitespace().collect();
            if query_words.iter().all(|w| label_words.contains(w)) {
                if let Some(result) = self.accept(hit).await {
                    return Some(result);
                }
            }
        }

        // Tier 3: substring fallback
        for hit in &results {
            if hit.label.to_lowercase().contains(query) {
                if let Some(result) = self.accept(hit).await {
                    return Some(result);
                }
            }
        }

        None
    }

    /// A candidate is accepted only if its entity yields a coordinate claim.
    /// Lookup failures count as non-matches so the cascade continues.
    async fn accept(&self, hit: &EntityHit) -> Option<ResolutionResult> {
        match self.kb.coordinates(&hit.id).await {
            Ok(Some(coordinates)) => {
                tracing::info!(
                    entity_id = %hit.id,
                    label = %hit.label,
                    lat = coordinates.latitude,
                    lon = coordinates.longitude,
                    "Resolved landmark coordinates"
                );
                Some(ResolutionResult {
                    coordinates,
                    external_id: hit.id.clone(),
                })
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(entity_id = %hit.id, error = %e, "Coordinate lookup failed");
                None
            }
        }
    }
}
