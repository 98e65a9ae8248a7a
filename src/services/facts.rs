//! Background-facts collaborator (Wikipedia page summaries)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Free-text facts source for a topic. `Ok(None)` means the topic has no
/// entry; that's an expected outcome, not an error.
#[async_trait]
pub trait FactsProvider: Send + Sync {
    async fn facts(&self, topic: &str) -> Result<Option<String>, FactsError>;
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    extract: Option<String>,
}

/// Wikipedia REST page-summary client
pub struct WikipediaClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl WikipediaClient {
    pub fn new(endpoint: &str, user_agent: &str, timeout_secs: u64) -> Result<Self, FactsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FactsError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FactsProvider for WikipediaClient {
    async fn facts(&self, topic: &str) -> Result<Option<String>, FactsError> {
        let title = topic.replace('_', " ");
        let url = format!("{}/{}", self.endpoint, title);

        tracing::debug!(topic = %topic, "Fetching background facts");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FactsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!(topic = %topic, status = %response.status(), "No facts entry");
            return Ok(None);
        }

        let summary: PageSummary = response
            .json()
            .await
            .map_err(|e| FactsError::Parse(e.to_string()))?;

        Ok(summary.extract.filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_summary_parsing() {
        let body = r#"{"title": "Eiffel Tower", "extract": "The Eiffel Tower is a wrought-iron lattice tower."}"#;
        let parsed: PageSummary = serde_json::from_str(body).unwrap();
        assert!(parsed.extract.unwrap().starts_with("The Eiffel Tower"));
    }

    #[test]
    fn test_page_summary_without_extract() {
        let parsed: PageSummary = serde_json::from_str(r#"{"title": "Nothing"}"#).unwrap();
        assert!(parsed.extract.is_none());
    }

    #[test]
    fn test_client_creation() {
        let client = WikipediaClient::new(
            "https://en.wikipedia.org/api/rest_v1/page/summary/",
            "landmark-finder/0.1",
            10,
        );
        assert!(client.is_ok());
        assert!(!client.unwrap().endpoint.ends_with('/'));
    }
}
