pub mod keys;
pub mod providers;

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

use promptloom_core::error::{LoomError, Result};
use promptloom_core::traits::{Completion, CompletionClient, CompletionRequest};

pub use keys::{ApiKeyStore, EnvKeyStore, MemoryKeyStore};

/// Routes completion requests to the provider named in the request.
///
/// Supported providers: `openai`, `anthropic`, `google`, `ollama`,
/// `deepseek`. Credentials come from the [`ApiKeyStore`] per user+provider;
/// for ollama the stored "key" is the instance host, falling back to a
/// configured base URL.
pub struct CompletionRouter {
    http: Client,
    keys: Arc<dyn ApiKeyStore>,
    ollama_base_url: String,
}

impl CompletionRouter {
    pub fn new(keys: Arc<dyn ApiKeyStore>) -> Self {
        Self {
            http: Client::new(),
            keys,
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }

    pub fn with_ollama_base_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_base_url = url.into();
        self
    }

    fn require_key(&self, user_id: &str, provider: &str) -> Result<String> {
        self.keys.resolve(user_id, provider).ok_or_else(|| {
            LoomError::Provider(format!("No API key found for provider: {}", provider))
        })
    }

    async fn generate(&self, request: CompletionRequest) -> Result<Completion> {
        let CompletionRequest {
            user_id,
            provider,
            model,
            prompt,
            temperature,
            max_tokens,
        } = request;

        debug!(%provider, %model, "dispatching completion request");

        let text = match provider.as_str() {
            "openai" => {
                let key = self.require_key(&user_id, &provider)?;
                providers::openai::complete(
                    &self.http,
                    "OpenAI",
                    providers::openai::OPENAI_API_URL,
                    &key,
                    &model,
                    &prompt,
                    temperature,
                    max_tokens,
                )
                .await?
            }
            "deepseek" => {
                let key = self.require_key(&user_id, &provider)?;
                providers::openai::complete(
                    &self.http,
                    "DeepSeek",
                    providers::openai::DEEPSEEK_API_URL,
                    &key,
                    &model,
                    &prompt,
                    temperature,
                    max_tokens,
                )
                .await?
            }
            "anthropic" => {
                let key = self.require_key(&user_id, &provider)?;
                providers::anthropic::complete(
                    &self.http, &key, &model, &prompt, temperature, max_tokens,
                )
                .await?
            }
            "google" => {
                let key = self.require_key(&user_id, &provider)?;
                providers::gemini::complete(
                    &self.http, &key, &model, &prompt, temperature, max_tokens,
                )
                .await?
            }
            "ollama" => {
                let base = self
                    .keys
                    .resolve(&user_id, &provider)
                    .unwrap_or_else(|| self.ollama_base_url.clone());
                providers::ollama::complete(
                    &self.http, &base, &model, &prompt, temperature, max_tokens,
                )
                .await?
            }
            other => {
                return Err(LoomError::Provider(format!("Unsupported provider: {}", other)));
            }
        };

        Ok(Completion { text, provider, model })
    }
}

impl CompletionClient for CompletionRouter {
    fn generate_completion(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(self.generate(request))
    }
}
