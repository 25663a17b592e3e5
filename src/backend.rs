//! Enrichment backend implementations and selection.
//!
//! The [`EnrichmentBackend`] trait, the schema and the validating parse live
//! in `note-enricher-core`. This module adds the network-backed variant and
//! picks one from configuration:
//!
//! - **[`StubBackend`]** — deterministic, offline; re-exported from core.
//! - **[`GeminiBackend`]** — calls the Google Gemini `generateContent` API
//!   with a JSON response schema.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use note_enricher::config::EnrichmentConfig;
//! # use note_enricher::backend::create_backend;
//! let config = EnrichmentConfig::default(); // backend = "stub"
//! let backend = create_backend(&config).unwrap();
//! ```
//!
//! # Failure Policy
//!
//! One HTTP request per enrichment. Transport errors, non-2xx statuses,
//! empty candidates and schema violations are all reported as
//! [`EnrichmentError`]; nothing is retried.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use note_enricher_core::enrichment::{analysis_prompt, enrichment_schema, parse_enrichment_str};
pub use note_enricher_core::enrichment::{EnrichmentBackend, StubBackend};
use note_enricher_core::{Enrichment, EnrichmentError};

use crate::config::EnrichmentConfig;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Build the backend named by `config.backend`.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"stub"` | [`StubBackend`] |
/// | `"gemini"` | [`GeminiBackend`] (needs `GEMINI_API_KEY`) |
pub fn create_backend(config: &EnrichmentConfig) -> Result<Arc<dyn EnrichmentBackend>> {
    match config.backend.as_str() {
        "stub" => Ok(Arc::new(StubBackend::new())),
        "gemini" => Ok(Arc::new(GeminiBackend::new(config)?)),
        other => bail!("Unknown enrichment backend: {}", other),
    }
}

// ============ Gemini Backend ============

/// Enrichment backend using the Gemini API.
///
/// Sends `POST {base_url}/v1beta/models/{model}:generateContent` with the
/// analysis prompt and `generationConfig.responseJsonSchema` set to the
/// enrichment schema, then validates the first candidate's text against the
/// same schema.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    generation_config: Value,
    schema: Value,
}

impl GeminiBackend {
    /// Create a backend reading the API key from `GEMINI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty, or if the HTTP
    /// client cannot be built.
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = match std::env::var(GEMINI_API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!(
                "{} environment variable is required for the gemini backend",
                GEMINI_API_KEY_VAR
            ),
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EnrichmentConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let schema = enrichment_schema();
        let generation_config = json!({
            "temperature": config.temperature,
            "topP": config.top_p,
            "topK": config.top_k,
            "maxOutputTokens": config.max_output_tokens,
            "responseMimeType": "application/json",
            "responseJsonSchema": schema,
        });

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: config.model.clone(),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            generation_config,
            schema,
        })
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": analysis_prompt(text, &self.schema) }]
            }],
            "generationConfig": self.generation_config,
        })
    }
}

#[async_trait]
impl EnrichmentBackend for GeminiBackend {
    async fn enrich(&self, text: &str) -> Result<Enrichment, EnrichmentError> {
        tracing::debug!(
            model = %self.model,
            chars = text.len(),
            "requesting gemini enrichment"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| EnrichmentError::Request(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %self.model, %status, "gemini returned an error status");
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| EnrichmentError::Request(Box::new(e)))?;
        let json: Value = serde_json::from_str(&body)?;
        let generated = candidate_text(&json)?;
        let fields = parse_enrichment_str(&generated)?;

        tracing::debug!(
            model = %self.model,
            sentiment = %fields.sentiment,
            "gemini enrichment parsed"
        );
        Ok(Enrichment {
            fields,
            model: self.model.clone(),
        })
    }
}

/// Concatenated text parts of the first candidate in a `generateContent`
/// response.
fn candidate_text(json: &Value) -> Result<String, EnrichmentError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or(EnrichmentError::EmptyResponse)?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        Err(EnrichmentError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_config() -> EnrichmentConfig {
        EnrichmentConfig {
            backend: "gemini".to_string(),
            base_url: "http://localhost:1/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_stub_backend() {
        assert!(create_backend(&EnrichmentConfig::default()).is_ok());
    }

    #[test]
    fn test_create_unknown_backend_fails() {
        let config = EnrichmentConfig {
            backend: "mystery".to_string(),
            ..Default::default()
        };
        assert!(create_backend(&config).is_err());
    }

    #[test]
    fn test_endpoint_and_request_body() {
        let backend = GeminiBackend::with_api_key(&gemini_config(), "k").unwrap();
        assert_eq!(
            backend.endpoint,
            "http://localhost:1/v1beta/models/gemini-2.5-flash:generateContent"
        );
        let body = backend.request_body("Water the plants");
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("Water the plants"));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(
            body["generationConfig"]["responseJsonSchema"],
            enrichment_schema()
        );
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] }
            }]
        });
        assert_eq!(candidate_text(&json).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_candidate_text_missing() {
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            candidate_text(&blocked),
            Err(EnrichmentError::EmptyResponse)
        ));
        let empty = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(matches!(
            candidate_text(&empty),
            Err(EnrichmentError::EmptyResponse)
        ));
    }
}
