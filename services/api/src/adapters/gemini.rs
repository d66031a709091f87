//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for Google's Gemini `generateContent` REST API.
//! It implements the `CompletionService` port and is the primary provider of the
//! completion chain, since it can enforce a response schema natively.

use async_trait::async_trait;
use reminders_core::ports::{CompletionRequest, CompletionService, PortError, PortResult};
use serde::Deserialize;
use serde_json::{json, Value};

const PROVIDER: &str = "gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct GeminiAdapter {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiAdapter {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
    });
    if let Some(schema) = &request.schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

/// Joins the text parts of the first candidate.
fn first_candidate_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    Some(text)
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for GeminiAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> PortResult<String> {
        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| PortError::provider(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorEnvelope>().await {
                Ok(envelope) => envelope.error.message,
                Err(_) => status.to_string(),
            };
            return Err(PortError::provider(PROVIDER, message));
        }

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| PortError::provider(PROVIDER, e))?;

        first_candidate_text(parsed).ok_or_else(|| PortError::EmptyResponse {
            provider: PROVIDER.to_string(),
        })
    }
}
