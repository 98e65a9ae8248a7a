//! LLM summary/chat collaborator
//!
//! A Gemini-style `generateContent` endpoint behind the `SummaryProvider`
//! trait. Summary failures are local errors the enrichment orchestrator
//! converts into "no summary"; they never block landmark creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Summary API key not configured")]
    MissingApiKey,
}

/// One prior exchange in a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Summarize why a topic is famous, grounded in the supplied facts
    async fn generate_summary(&self, topic: &str, facts: &str) -> Result<String, SummaryError>;

    /// Answer a follow-up question with optional conversation history
    async fn chat(&self, message: &str, history: &[ChatTurn]) -> Result<String, SummaryError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, SummaryError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SummaryError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    async fn generate(&self, contents: serde_json::Value) -> Result<String, SummaryError> {
        let api_key = self.api_key.as_ref().ok_or(SummaryError::MissingApiKey)?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, api_key
        );

        let response = self
            .http_client
            .post(&url)
            .json(&json!({ "contents": contents }))
            .send()
            .await
            .map_err(|e| SummaryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SummaryError::Api(status.as_u16(), error_text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::Network(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(SummaryError::EmptyResponse)?;

        Ok(text)
    }
}

/// Prompt for the landmark summary, kept close to 3-4 factual sentences
fn summary_prompt(topic: &str, facts: &str) -> String {
    format!(
        "Summarize in 3-4 sentences why {} is famous.\n\
         Use the facts below. Be factual and concise.\n\n\
         Facts:\n{}",
        topic.replace('_', " "),
        facts
    )
}

#[async_trait]
impl SummaryProvider for GeminiClient {
    async fn generate_summary(&self, topic: &str, facts: &str) -> Result<String, SummaryError> {
        tracing::debug!(topic = %topic, "Requesting landmark summary");
        let contents = json!([
            {"role": "user", "parts": [{"text": summary_prompt(topic, facts)}]}
        ]);
        self.generate(contents).await
    }

    async fn chat(&self, message: &str, history: &[ChatTurn]) -> Result<String, SummaryError> {
        let mut contents = Vec::new();
        for turn in history {
            contents.push(json!({"role": "user", "parts": [{"text": turn.question}]}));
            contents.push(json!({"role": "model", "parts": [{"text": turn.answer}]}));
        }
        contents.push(json!({"role": "user", "parts": [{"text": message}]}));

        self.generate(serde_json::Value::Array(contents)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prompt_uses_spaced_name() {
        let prompt = summary_prompt("eiffel_tower", "Built 1889.");
        assert!(prompt.contains("eiffel tower"));
        assert!(prompt.contains("Built 1889."));
        assert!(!prompt.contains("eiffel_tower"));
    }

    #[test]
    fn test_generate_response_parsing() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "  A famous tower.  "}], "role": "model"}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text.trim(), "A famous tower.");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_local_error() {
        let client = GeminiClient::new("https://example.invalid/v1beta", "gemini-2.5-flash", None, 10)
            .unwrap();
        let err = client.generate_summary("eiffel_tower", "facts").await.unwrap_err();
        assert!(matches!(err, SummaryError::MissingApiKey));
    }
}
