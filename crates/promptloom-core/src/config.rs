use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoomError, Result};

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_scraper_timeout() -> u64 {
    120
}

fn default_request_timeout() -> u64 {
    60
}

/// Engine configuration.
///
/// Loaded from a TOML file or from the environment. The scraper service URL
/// has no default; a scraper node run without one records a node-level
/// failure rather than aborting the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the external scraping microservice.
    #[serde(default)]
    pub scraper_service_url: Option<String>,
    /// Base URL used for the ollama provider when no per-user key/host is set.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
    /// Timeout for scraper service calls, in seconds. Scrapes are slow;
    /// the default is deliberately generous.
    #[serde(default = "default_scraper_timeout")]
    pub scraper_timeout_secs: u64,
    /// Timeout for generic API-call nodes, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scraper_service_url: None,
            ollama_base_url: default_ollama_base_url(),
            scraper_timeout_secs: default_scraper_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoomError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| LoomError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SCRAPER_SERVICE_URL") {
            if !url.is_empty() {
                config.scraper_service_url = Some(url);
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                config.ollama_base_url = host;
            }
        }
        config
    }

    /// Load from `path` if it exists, otherwise read the environment.
    pub fn load_or_env(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::from_env())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.scraper_service_url.is_none());
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.scraper_timeout_secs, 120);
    }

    #[test]
    fn test_parse_partial_toml() {
        // Base URL only; the engine appends /scrape itself
        let config: EngineConfig =
            toml::from_str("scraper_service_url = \"http://localhost:3000\"").unwrap();
        assert_eq!(
            config.scraper_service_url.as_deref(),
            Some("http://localhost:3000")
        );
        assert_eq!(config.scraper_timeout_secs, 120);
    }
}
