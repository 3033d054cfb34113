//! Provider registry: one model client per declared provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::client::ModelClient;
use super::openai::OpenAICompatibleClient;
use crate::config::{ChatConfig, ProviderConfig};
use crate::error::ConfigurationError;

/// A registry slot: either a ready client, or the reason there is none.
#[derive(Clone)]
enum Entry {
    Ready(Arc<dyn ModelClient>),
    Unavailable(ConfigurationError),
}

/// Registry of model clients, keyed by provider name.
///
/// Built once at startup and shared read-only. Providers declared without a
/// credential stay in the registry so that selecting them reports a
/// [`ConfigurationError::MissingCredential`] instead of an unknown provider.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, Entry>,
    models: BTreeMap<String, String>,
}

/// Public view of one registry entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub name: String,
    pub model: String,
    pub configured: bool,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every declared provider, reading credentials from the environment.
    pub fn from_config(providers: &[ProviderConfig], chat: &ChatConfig) -> Self {
        let mut registry = Self::new();

        for provider in providers {
            match provider.api_key() {
                Some(api_key) => {
                    let base_url = provider.resolved_base_url();
                    let client = OpenAICompatibleClient::new(&base_url, api_key, &provider.model)
                        .with_sampling(chat.temperature, chat.max_tokens);
                    registry.register(&provider.name, Arc::new(client));
                    info!(provider = %provider.name, model = %provider.model, base_url = %base_url, "Registered provider");
                }
                None => {
                    warn!(
                        provider = %provider.name,
                        env_var = %provider.api_key_env,
                        "Provider has no credential; requests to it will fail"
                    );
                    registry.register_unavailable(
                        &provider.name,
                        &provider.model,
                        ConfigurationError::MissingCredential {
                            provider: provider.name.clone(),
                            env_var: provider.api_key_env.clone(),
                        },
                    );
                }
            }
        }

        registry
    }

    /// Register a client implementation.
    pub fn register(&mut self, name: &str, client: Arc<dyn ModelClient>) {
        self.models.insert(name.to_string(), client.model().to_string());
        self.entries.insert(name.to_string(), Entry::Ready(client));
    }

    /// Declare a provider that cannot be used, remembering why.
    pub fn register_unavailable(&mut self, name: &str, model: &str, reason: ConfigurationError) {
        self.models.insert(name.to_string(), model.to_string());
        self.entries.insert(name.to_string(), Entry::Unavailable(reason));
    }

    /// Select a client by provider name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ModelClient>, ConfigurationError> {
        match self.entries.get(name) {
            Some(Entry::Ready(client)) => Ok(client.clone()),
            Some(Entry::Unavailable(reason)) => Err(reason.clone()),
            None => Err(ConfigurationError::UnknownProvider(name.to_string())),
        }
    }

    /// All declared providers, sorted by name.
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.entries
            .iter()
            .map(|(name, entry)| ProviderStatus {
                name: name.clone(),
                model: self.models.get(name).cloned().unwrap_or_default(),
                configured: matches!(entry, Entry::Ready(_)),
            })
            .collect()
    }
}
