//! Google Gemini `generateContent` client.
//!
//! Same shape as the Anthropic client: a thin HTTP wrapper plus a pure
//! `parse_response`.

use super::config::LlmTimeouts;
use super::types::LlmError;
use std::time::Duration;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// =============================================================================
// CLIENT
// =============================================================================

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key })
    }

    pub async fn complete(&self, model: &str, max_tokens: u32, prompt: &str) -> Result<String, LlmError> {
        let body = ApiRequest {
            contents: [ApiContent { role: "user", parts: [ApiPart { text: prompt }] }],
            generation_config: GenerationConfig { max_output_tokens: max_tokens },
        };

        let response = self
            .http
            .post(endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }

        parse_response(&text)
    }
}

fn endpoint(model: &str) -> String {
    format!("{API_BASE}/{model}:generateContent")
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    contents: [ApiContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct ApiContent<'a> {
    role: &'a str,
    parts: [ApiPart<'a>; 1],
}

#[derive(serde::Serialize)]
struct ApiPart<'a> {
    text: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Extract the text parts of the first candidate.
fn parse_response(json: &str) -> Result<String, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let text: String = api
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::ApiParse("response contained no text".into()));
    }
    Ok(text)
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
