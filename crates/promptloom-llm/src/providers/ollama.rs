use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use promptloom_core::error::{LoomError, Result};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    num_predict: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Local completion via Ollama's native generate endpoint. The "key" for
/// this provider is the host of the Ollama instance.
pub(crate) async fn complete(
    http: &Client,
    base_url: &str,
    model: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let url = format!("{}/api/generate", normalize_base(base_url));

    let body = GenerateRequest {
        model,
        prompt,
        temperature,
        num_predict: max_tokens,
        stream: false,
    };

    let response = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| LoomError::Provider(format!("Ollama API exception: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| "Unknown error".to_string());
        error!(provider = "ollama", status = %status, "completion request failed");
        return Err(LoomError::Provider(format!("Ollama API error: {}", message)));
    }

    let data: GenerateResponse = response
        .json()
        .await
        .map_err(|e| LoomError::Provider(format!("Ollama API error: {}", e)))?;

    Ok(data.response)
}

/// Hosts configured without a scheme get http:// prefixed.
fn normalize_base(base_url: &str) -> String {
    let base = if base_url.starts_with("http") {
        base_url.to_string()
    } else {
        format!("http://{}", base_url)
    };
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(normalize_base("localhost:11434"), "http://localhost:11434");
        assert_eq!(normalize_base("http://10.0.0.2:11434/"), "http://10.0.0.2:11434");
    }
}
