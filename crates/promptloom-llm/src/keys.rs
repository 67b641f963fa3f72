use std::sync::Mutex;

/// Per-user provider credential lookup.
///
/// The engine never sees raw credentials; the completion router resolves
/// them here per request. A user may hold several keys for one provider;
/// the one marked default wins.
pub trait ApiKeyStore: Send + Sync + 'static {
    fn resolve(&self, user_id: &str, provider: &str) -> Option<String>;
}

struct StoredKey {
    user_id: String,
    provider: String,
    key: String,
    is_default: bool,
}

/// In-memory key store honoring default-key preference.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<Vec<StoredKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        user_id: impl Into<String>,
        provider: impl Into<String>,
        key: impl Into<String>,
        is_default: bool,
    ) {
        self.keys.lock().expect("key store lock poisoned").push(StoredKey {
            user_id: user_id.into(),
            provider: provider.into(),
            key: key.into(),
            is_default,
        });
    }
}

impl ApiKeyStore for MemoryKeyStore {
    fn resolve(&self, user_id: &str, provider: &str) -> Option<String> {
        let keys = self.keys.lock().expect("key store lock poisoned");
        let matches = || {
            keys.iter()
                .filter(|k| k.user_id == user_id && k.provider == provider)
        };
        matches()
            .find(|k| k.is_default)
            .or_else(|| matches().next())
            .map(|k| k.key.clone())
    }
}

/// Key store backed by conventional environment variables, ignoring the
/// user id. Useful for the CLI and single-tenant deployments.
pub struct EnvKeyStore;

impl ApiKeyStore for EnvKeyStore {
    fn resolve(&self, _user_id: &str, provider: &str) -> Option<String> {
        let var = match provider {
            "openai" => "OPENAI_API_KEY",
            "anthropic" => "ANTHROPIC_API_KEY",
            "google" => "GOOGLE_API_KEY",
            "ollama" => "OLLAMA_HOST",
            "deepseek" => "DEEPSEEK_API_KEY",
            _ => return None,
        };
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }
}
