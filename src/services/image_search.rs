//! Keyword image-search collaborator (DuckDuckGo)
//!
//! DuckDuckGo's image endpoint wants a per-query `vqd` token scraped from
//! the search page before `i.js` will answer. Both steps are bounded-timeout
//! GETs; any failure surfaces as a typed error the acquirer downgrades to
//! "this keyword produced nothing".

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Token extraction failed for query: {0}")]
    TokenNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Ordered image-URL results for a keyword query
#[async_trait]
pub trait ImageSearchProvider: Send + Sync {
    async fn search_images(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct ImageResults {
    #[serde(default)]
    results: Vec<ImageResult>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    #[serde(default)]
    image: String,
}

pub struct DuckDuckGoClient {
    http_client: reqwest::Client,
    endpoint: String,
    vqd_pattern: Regex,
}

impl DuckDuckGoClient {
    pub fn new(endpoint: &str, user_agent: &str, timeout_secs: u64) -> Result<Self, SearchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        // vqd token embedded in the search page, e.g. vqd="4-128..."
        let vqd_pattern = Regex::new(r#"vqd=["']?([\d-]+)"#)
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            vqd_pattern,
        })
    }

    async fn fetch_token(&self, query: &str) -> Result<String, SearchError> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("q", query), ("iax", "images"), ("ia", "images")])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::Api(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        self.vqd_pattern
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SearchError::TokenNotFound(query.to_string()))
    }
}

#[async_trait]
impl ImageSearchProvider for DuckDuckGoClient {
    async fn search_images(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, SearchError> {
        let token = self.fetch_token(query).await?;

        tracing::debug!(query = %query, "Querying image search");

        let url = format!("{}/i.js", self.endpoint);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("l", "us-en"),
                ("o", "json"),
                ("q", query),
                ("vqd", token.as_str()),
                ("p", "-1"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::Api(status.as_u16(), error_text));
        }

        let parsed: ImageResults = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| r.image)
            .filter(|u| !u.is_empty())
            .take(max_results)
            .collect())
    }
}
