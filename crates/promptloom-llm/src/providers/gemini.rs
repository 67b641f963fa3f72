use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use promptloom_core::error::{LoomError, Result};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

pub(crate) async fn complete(
    http: &Client,
    api_key: &str,
    model: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    // Gemini authenticates via a key query parameter rather than a header
    let url = format!("{}/{}:generateContent?key={}", GEMINI_API_BASE, model, api_key);

    let body = GenerateRequest {
        contents: vec![Content { parts: vec![Part { text: prompt }] }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens: max_tokens,
        },
    };

    let response = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| LoomError::Provider(format!("Google AI API exception: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| "Unknown error".to_string());
        error!(provider = "google", status = %status, "completion request failed");
        return Err(LoomError::Provider(format!("Google AI API error: {}", message)));
    }

    let data: GenerateResponse = response
        .json()
        .await
        .map_err(|e| LoomError::Provider(format!("Google AI API error: {}", e)))?;

    data.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| LoomError::Provider("Google AI API error: empty response".to_string()))
}
