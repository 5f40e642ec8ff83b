// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Text-completion client.
//!
//! The generator only needs "prompt in, text out", so the collaborator sits
//! behind the `CompletionClient` trait. `GeminiClient` talks to the Google
//! generative-language REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion failures, split by whether they mean "misconfigured or
/// unavailable" (credential, quota, model) or something else.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion API rejected the request: {0}")]
    Unauthorized(String),

    #[error("Completion request timed out")]
    Timeout,

    #[error("Completion request failed: {0}")]
    Transport(String),

    #[error("Completion API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Completion API returned no text")]
    EmptyResponse,
}

impl CompletionError {
    /// Authorization/availability failures are masked by the generator's
    /// fallback; everything else is surfaced.
    pub fn is_authorization_class(&self) -> bool {
        matches!(self, CompletionError::Unauthorized(_))
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one prompt, get the raw completion text back.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

// ─── Gemini ──────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Gemini REST client.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Map a non-success response to an error class.
    fn classify_failure(status: u16, body: &str) -> CompletionError {
        // Lower-case; compared against the lower-cased body.
        const KEY_MARKERS: [&str; 5] = [
            "api key",
            "api_key_invalid",
            "unregistered callers",
            "permission_denied",
            "forbidden",
        ];
        let lowered = body.to_lowercase();

        match status {
            401 | 403 => CompletionError::Unauthorized(format!("HTTP {}", status)),
            404 => CompletionError::Unauthorized("model not found".to_string()),
            429 => CompletionError::Unauthorized("quota exceeded".to_string()),
            400 if KEY_MARKERS.iter().any(|m| lowered.contains(m)) => {
                CompletionError::Unauthorized("invalid API key".to_string())
            }
            _ => CompletionError::Api {
                status,
                message: body.chars().take(500).collect(),
            },
        }
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        if self.api_key.is_empty() {
            return Err(CompletionError::Unauthorized(
                "GEMINI_API_KEY is not configured".to_string(),
            ));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Self::classify_failure(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), error = %err, "Gemini request failed");
            return Err(err);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Transport(format!("Invalid response body: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        Ok(text)
    }
}
