use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use crate::error::{LoomError, Result};
use crate::run::ExecutionRun;

/// A completion request routed to an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The user whose credentials resolve the provider API key.
    pub user_id: String,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A successful completion from a provider.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// LLM completion client — multi-provider, non-streaming.
pub trait CompletionClient: Send + Sync + 'static {
    /// Generate a completion. Unknown providers and missing credentials are
    /// reported as [`LoomError::Provider`].
    fn generate_completion(&self, request: CompletionRequest)
        -> BoxFuture<'_, Result<Completion>>;
}

/// Read-only lookup of saved prompt content, used when a prompt node
/// references a stored prompt instead of carrying inline content.
pub trait PromptStore: Send + Sync + 'static {
    /// Content of the prompt's current version.
    fn current_version_content(&self, prompt_id: &str) -> BoxFuture<'_, Result<String>>;
}

/// Persistence sink for run status transitions and final state.
pub trait RunStore: Send + Sync + 'static {
    /// Persist a snapshot of the run. Called on every status transition.
    fn save(&self, run: &ExecutionRun) -> BoxFuture<'_, Result<()>>;
}

/// In-memory prompt store for embedding and tests.
#[derive(Default)]
pub struct MemoryPromptStore {
    prompts: Mutex<HashMap<String, String>>,
}

impl MemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, prompt_id: impl Into<String>, content: impl Into<String>) {
        self.prompts
            .lock()
            .expect("prompt store lock poisoned")
            .insert(prompt_id.into(), content.into());
    }
}

impl PromptStore for MemoryPromptStore {
    fn current_version_content(&self, prompt_id: &str) -> BoxFuture<'_, Result<String>> {
        let found = self
            .prompts
            .lock()
            .expect("prompt store lock poisoned")
            .get(prompt_id)
            .cloned();
        let prompt_id = prompt_id.to_string();
        Box::pin(async move {
            found.ok_or_else(|| LoomError::Store(format!("Prompt not found: {}", prompt_id)))
        })
    }
}
