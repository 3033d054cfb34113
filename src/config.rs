//! Runtime configuration for query-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Provider credentials are never stored in the file: each provider names the
//! environment variable its API key is read from.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "query-relay", about = "Streaming LLM query relay")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Provider used for chat turns (overrides the config file).
    #[arg(long)]
    pub provider: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Chat turn settings.
    pub chat: ChatConfig,

    /// Declared model providers.
    pub providers: ProvidersConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,

    /// Maximum concurrent requests.
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            max_concurrent_requests: 64,
        }
    }
}

/// Settings applied to every chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Name of the provider that answers queries.
    pub provider: String,

    /// Conversation used when a request carries no thread id.
    pub default_thread_id: String,

    /// Sampling temperature forwarded to the provider.
    pub temperature: Option<f32>,

    /// Output token cap forwarded to the provider.
    pub max_tokens: Option<u32>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: "moonshotai".to_string(),
            default_thread_id: "1".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// One OpenAI-compatible provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Name requests select the provider by.
    pub name: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Base URL of the chat completions API (without `/chat/completions`).
    pub base_url: String,

    /// Environment variable that overrides `base_url` when set.
    #[serde(default)]
    pub base_url_env: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl ProviderConfig {
    /// Base URL after applying the `base_url_env` override.
    pub fn resolved_base_url(&self) -> String {
        self.base_url_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone())
    }

    /// API key from the environment, if present and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// The provider table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(pub Vec<ProviderConfig>);

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self(vec![
            ProviderConfig {
                name: "gemini".to_string(),
                model: "gemini-1.5-flash".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
                base_url_env: None,
                api_key_env: "GOOGLE_API_KEY".to_string(),
            },
            ProviderConfig {
                name: "deepseek".to_string(),
                model: "deepseek/deepseek-chat-v3-0324:free".to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                base_url_env: Some("OPENROUTER_BASE_URL".to_string()),
                api_key_env: "OPENROUTER_API_KEY".to_string(),
            },
            ProviderConfig {
                name: "moonshotai".to_string(),
                model: "moonshotai/kimi-k2-instruct".to_string(),
                base_url: "https://api.groq.com/openai/v1".to_string(),
                base_url_env: None,
                api_key_env: "GROQ_API_KEY".to_string(),
            },
        ])
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(provider) = &cli.provider {
            self.chat.provider = provider.clone();
        }
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.trim().is_empty() {
            bail!("server.listen must not be empty");
        }
        if self.server.max_concurrent_requests == 0 {
            bail!("server.max_concurrent_requests must be at least 1");
        }
        if self.chat.default_thread_id.is_empty() {
            bail!("chat.default_thread_id must not be empty");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers.0 {
            if !seen.insert(provider.name.as_str()) {
                bail!("provider '{}' is declared more than once", provider.name);
            }
        }
        if !seen.contains(self.chat.provider.as_str()) {
            bail!(
                "chat.provider '{}' is not among the declared providers",
                self.chat.provider
            );
        }
        Ok(())
    }

    /// Look up a declared provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.0.iter().find(|p| p.name == name)
    }
}
