//! Provider registry: constructs and holds all configured LLM
//! provider instances from `ProviderConfig`, resolving `vendor_tag` to an
//! adapter and masking secrets out of any init errors it collects.

use std::collections::HashMap;
use std::sync::Arc;

use arena_domain::scenario::ProviderConfig;
use arena_domain::{Error, Result};

use crate::http_provider::HttpProvider;
use crate::traits::LlmProvider;

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub vendor_tag: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message before it's logged or stored where an operator might read it.
pub fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20 && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

/// Holds all instantiated LLM providers, keyed by their config id.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    init_errors: Vec<ProviderInitError>,
}

impl ProviderRegistry {
    /// Build the registry from a list of `ProviderConfig`s plus a resolver
    /// that turns `vendor_tag` + base URL into a concrete adapter. Every
    /// vendor in this crate resolves to [`HttpProvider`] since per-vendor
    /// wire codecs are out of scope; the `base_url` comes from each
    /// config's `parameters.base_url`.
    ///
    /// A provider that fails to initialize (e.g. missing auth env var) is
    /// logged and recorded in `init_errors` rather than aborting
    /// construction of the whole registry.
    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors = Vec::new();

        for cfg in configs {
            match build_provider(cfg) {
                Ok(provider) => {
                    tracing::info!(provider_id = %cfg.id, vendor = %cfg.vendor_tag, "registered LLM provider");
                    providers.insert(cfg.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %cfg.id,
                        vendor = %cfg.vendor_tag,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: cfg.id.clone(),
                        vendor_tag: cfg.vendor_tag.clone(),
                        error: safe_error,
                    });
                }
            }
        }

        Self { providers, init_errors }
    }

    /// Register an already-constructed provider (used for `MockProvider`
    /// and in tests, where there's no `ProviderConfig` to resolve from).
    pub fn insert(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            init_errors: Vec::new(),
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded), exposed so
    /// a run summary can report which providers were skipped and why.
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

fn build_provider(cfg: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let base_url = cfg
        .parameters
        .get("base_url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Config(format!("provider '{}': missing parameters.base_url", cfg.id)))?;
    let provider = HttpProvider::new(cfg.id.clone(), base_url, &cfg.auth_env_key, cfg.pricing)?;
    Ok(Arc::new(provider))
}
