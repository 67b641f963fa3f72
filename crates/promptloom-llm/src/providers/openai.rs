use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use promptloom_core::error::{LoomError, Result};

pub(crate) const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub(crate) const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
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

/// OpenAI-compatible chat completion. Also used for DeepSeek, which exposes
/// the same request/response shape on its own base URL.
pub(crate) async fn complete(
    http: &Client,
    label: &str,
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let body = ChatRequest {
        model,
        messages: vec![ChatMessage { role: "user", content: prompt }],
        temperature,
        max_tokens,
    };

    let response = http
        .post(base_url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| LoomError::Provider(format!("{} API exception: {}", label, e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| "Unknown error".to_string());
        error!(provider = label, status = %status, "completion request failed");
        return Err(LoomError::Provider(format!("{} API error: {}", label, message)));
    }

    let data: ChatResponse = response
        .json()
        .await
        .map_err(|e| LoomError::Provider(format!("{} API error: {}", label, e)))?;

    data.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| LoomError::Provider(format!("{} API error: empty response", label)))
}
