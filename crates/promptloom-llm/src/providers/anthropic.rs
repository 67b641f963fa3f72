use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use promptloom_core::error::{LoomError, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
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
    let body = MessagesRequest {
        model,
        messages: vec![ApiMessage { role: "user", content: prompt }],
        temperature,
        max_tokens,
    };

    let response = http
        .post(ANTHROPIC_API_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|e| LoomError::Provider(format!("Anthropic API exception: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| "Unknown error".to_string());
        error!(provider = "anthropic", status = %status, "completion request failed");
        return Err(LoomError::Provider(format!("Anthropic API error: {}", message)));
    }

    let data: MessagesResponse = response
        .json()
        .await
        .map_err(|e| LoomError::Provider(format!("Anthropic API error: {}", e)))?;

    data.content
        .into_iter()
        .next()
        .map(|b| b.text)
        .ok_or_else(|| LoomError::Provider("Anthropic API error: empty response".to_string()))
}
