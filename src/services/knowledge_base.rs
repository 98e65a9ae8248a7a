//! Knowledge-base client (Wikidata)
//!
//! Entity search plus coordinate lookup, behind the `KnowledgeBase` trait so
//! the geo-resolver can be exercised against a stub. Errors are typed so
//! callers can tell "no such entity" from "the network hiccuped" from
//! "the response didn't parse".

use crate::models::Coordinates;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const SEARCH_LANGUAGE: &str = "en";
const SEARCH_LIMIT: u32 = 10;
/// Coordinate-location property on Wikidata entities
const COORDINATE_PROPERTY: &str = "P625";
const RATE_LIMIT_MS: u64 = 1000; // 1 request per second

/// Knowledge-base client errors
#[derive(Debug, Error)]
pub enum KbError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One search hit: the entity's id and display label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHit {
    pub id: String,
    pub label: String,
}

/// External structured entity source: ordered search plus per-entity
/// coordinate lookup.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Ordered candidates for a free-text query
    async fn search(&self, query: &str) -> Result<Vec<EntityHit>, KbError>;

    /// Coordinates claimed by an entity, if it has any
    async fn coordinates(&self, entity_id: &str) -> Result<Option<Coordinates>, KbError>;
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// -- Wikidata wire formats --------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    entities: std::collections::HashMap<String, EntityDetail>,
}

#[derive(Debug, Deserialize)]
struct EntityDetail {
    #[serde(default)]
    claims: std::collections::HashMap<String, Vec<Claim>>,
}

#[derive(Debug, Deserialize)]
struct Claim {
    mainsnak: MainSnak,
}

#[derive(Debug, Deserialize)]
struct MainSnak {
    datavalue: Option<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    value: CoordinateValue,
}

#[derive(Debug, Deserialize)]
struct CoordinateValue {
    latitude: f64,
    longitude: f64,
}

/// Wikidata API client
pub struct WikidataClient {
    http_client: reqwest::Client,
    endpoint: String,
    rate_limiter: Arc<RateLimiter>,
}

impl WikidataClient {
    pub fn new(endpoint: &str, user_agent: &str, timeout_secs: u64) -> Result<Self, KbError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| KbError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }
}

#[async_trait]
impl KnowledgeBase for WikidataClient {
    async fn search(&self, query: &str) -> Result<Vec<EntityHit>, KbError> {
        self.rate_limiter.wait().await;

        tracing::debug!(query = %query, "Querying knowledge base for entities");

        let limit = SEARCH_LIMIT.to_string();
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", query),
                ("language", SEARCH_LANGUAGE),
                ("type", "item"),
                ("format", "json"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| KbError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(KbError::Api(status.as_u16(), error_text));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| KbError::Parse(e.to_string()))?;

        Ok(parsed
            .search
            .into_iter()
            .map(|entry| EntityHit {
                id: entry.id,
                label: entry.label,
            })
            .collect())
    }

    async fn coordinates(&self, entity_id: &str) -> Result<Option<Coordinates>, KbError> {
        self.rate_limiter.wait().await;

        tracing::debug!(entity_id = %entity_id, "Fetching entity coordinate claim");

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("action", "wbgetentities"),
                ("ids", entity_id),
                ("props", "claims"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| KbError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(KbError::Api(status.as_u16(), error_text));
        }

        let parsed: EntitiesResponse = response
            .json()
            .await
            .map_err(|e| KbError::Parse(e.to_string()))?;

        let entity = match parsed.entities.get(entity_id) {
            Some(entity) => entity,
            None => return Ok(None),
        };

        let coordinate = entity
            .claims
            .get(COORDINATE_PROPERTY)
            .and_then(|claims| claims.first())
            .and_then(|claim| claim.mainsnak.datavalue.as_ref())
            .map(|dv| Coordinates {
                latitude: dv.value.latitude,
                longitude: dv.value.longitude,
            });

        Ok(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = WikidataClient::new(
            "https://www.wikidata.org/w/api.php",
            "landmark-finder/0.1",
            10,
        );
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_timing() {
        let limiter = RateLimiter::new(200); // short interval for a fast test

        let start = Instant::now();
        limiter.wait().await;
        let first_elapsed = start.elapsed();

        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(100));
        assert!(second_elapsed >= Duration::from_millis(180));
    }

    #[test]
    fn test_entities_response_parsing() {
        let body = r#"{
            "entities": {
                "Q243": {
                    "claims": {
                        "P625": [{
                            "mainsnak": {
                                "datavalue": {
                                    "value": {"latitude": 48.8584, "longitude": 2.2945}
                                }
                            }
                        }]
                    }
                }
            }
        }"#;
        let parsed: EntitiesResponse = serde_json::from_str(body).unwrap();
        let coords = parsed.entities["Q243"].claims["P625"][0]
            .mainsnak
            .datavalue
            .as_ref()
            .unwrap();
        assert_eq!(coords.value.latitude, 48.8584);
    }

    #[test]
    fn test_entities_response_without_claim() {
        let body = r#"{"entities": {"Q1": {"claims": {}}}}"#;
        let parsed: EntitiesResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.entities["Q1"].claims.get(COORDINATE_PROPERTY).is_none());
    }
}
