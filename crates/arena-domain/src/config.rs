//! Arena-level configuration.
//!
//! Parsing the YAML/JSON document itself is out of scope for the core
//! (the format is consumed via `serde`); this module owns the shape and
//! the validation pass, accumulating a `Vec<ConfigError>` rather than
//! failing fast on the first problem.

use crate::scenario::{ProviderConfig, Scenario};
use crate::tool::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArenaConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub prompt_configs: Vec<PromptConfig>,
    #[serde(default)]
    pub tool_servers: Vec<ToolServerConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub state_store: StateStoreConfig,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            scenarios: Vec::new(),
            prompt_configs: Vec::new(),
            tool_servers: Vec::new(),
            defaults: DefaultsConfig::default(),
            state_store: StateStoreConfig::default(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptConfig {
    pub task_type: String,
    pub system_template: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    #[serde(default)]
    pub media: MediaCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorConfig {
    BannedWords { words: Vec<String> },
    MaxLength { max_chars: usize },
    Schema { schema: serde_json::Value },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaCapabilities {
    #[serde(default)]
    pub image: bool,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub document: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolServerConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_graceful_degradation")]
    pub graceful_degradation: bool,
    #[serde(default = "default_server_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_graceful_degradation() -> bool {
    true
}
fn default_server_timeout_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    #[serde(default = "default_run_timeout_ms")]
    pub per_run_timeout_ms: u64,
}

fn default_output_dir() -> String {
    "./results".to_string()
}
fn default_formats() -> Vec<String> {
    vec!["json".to_string()]
}
fn default_run_timeout_ms() -> u64 {
    120_000
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            formats: default_formats(),
            per_run_timeout_ms: default_run_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStoreKind {
    InMemory,
    OutOfProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateStoreConfig {
    #[serde(rename = "type", default = "default_store_kind")]
    pub kind: StateStoreKind,
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_store_kind() -> StateStoreKind {
    StateStoreKind::InMemory
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            key_prefix: "arena".to_string(),
            ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn err(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.to_string(),
            message: message.into(),
        }
    }
    fn warn(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ArenaConfig {
    /// Accumulates every problem found rather than failing on the first;
    /// callers filter by `ConfigSeverity::Error` to decide whether to
    /// abort (CLI exit code 2).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.providers.is_empty() {
            errors.push(ConfigError::warn("providers", "no providers configured"));
        }
        let mut provider_ids = std::collections::HashSet::new();
        for p in &self.providers {
            if p.id.is_empty() {
                errors.push(ConfigError::err("providers[].id", "provider id must not be empty"));
            }
            if !provider_ids.insert(p.id.clone()) {
                errors.push(ConfigError::err(
                    "providers[].id",
                    format!("duplicate provider id: {}", p.id),
                ));
            }
            if p.auth_env_key.is_empty() {
                errors.push(ConfigError::err(
                    "providers[].auth_env_key",
                    format!("provider {} missing auth_env_key", p.id),
                ));
            }
        }

        if self.scenarios.is_empty() {
            errors.push(ConfigError::err("scenarios", "at least one scenario is required"));
        }
        let mut scenario_ids = std::collections::HashSet::new();
        for s in &self.scenarios {
            if !scenario_ids.insert(s.id.clone()) {
                errors.push(ConfigError::err(
                    "scenarios[].id",
                    format!("duplicate scenario id: {}", s.id),
                ));
            }
            if s.turns.is_empty() {
                errors.push(ConfigError::warn(
                    "scenarios[].turns",
                    format!("scenario {} has no turns", s.id),
                ));
            }
        }

        for ts in &self.tool_servers {
            if ts.command.is_empty() {
                errors.push(ConfigError::err(
                    "tool_servers[].command",
                    format!("tool server {} missing command", ts.id),
                ));
            }
        }

        if self.max_concurrent == 0 {
            errors.push(ConfigError::err("max_concurrent", "must be at least 1"));
        }

        if matches!(self.state_store.kind, StateStoreKind::OutOfProcess)
            && self.state_store.key_prefix.is_empty()
        {
            errors.push(ConfigError::warn(
                "state_store.key_prefix",
                "out-of-process store with empty key_prefix may collide with other runs",
            ));
        }

        errors
    }

    pub fn has_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::TaskRef;

    fn provider(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            vendor_tag: "mock".to_string(),
            model: "mock-1".to_string(),
            region: "us".to_string(),
            parameters: HashMap::new(),
            auth_env_key: "MOCK_KEY".to_string(),
            pricing: Default::default(),
        }
    }

    fn scenario(id: &str) -> Scenario {
        Scenario {
            id: id.to_string(),
            description: String::new(),
            task: TaskRef::TaskType("chat".to_string()),
            turns: vec![],
            assertions: vec![],
        }
    }

    #[test]
    fn empty_config_flags_no_scenarios_as_error() {
        let cfg = ArenaConfig::default();
        let errors = cfg.validate();
        assert!(ArenaConfig::has_errors(&errors));
        assert!(errors.iter().any(|e| e.field == "scenarios"));
    }

    #[test]
    fn duplicate_provider_ids_flagged() {
        let mut cfg = ArenaConfig::default();
        cfg.providers = vec![provider("p1"), provider("p1")];
        cfg.scenarios = vec![scenario("s1")];
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("duplicate provider id")));
    }

    #[test]
    fn valid_config_has_no_errors() {
        let mut cfg = ArenaConfig::default();
        cfg.providers = vec![provider("p1")];
        cfg.scenarios = vec![scenario("s1")];
        let errors = cfg.validate();
        assert!(!ArenaConfig::has_errors(&errors));
    }

    #[test]
    fn zero_max_concurrent_is_error() {
        let mut cfg = ArenaConfig::default();
        cfg.providers = vec![provider("p1")];
        cfg.scenarios = vec![scenario("s1")];
        cfg.max_concurrent = 0;
        let errors = cfg.validate();
        assert!(ArenaConfig::has_errors(&errors));
    }

    #[test]
    fn deny_unknown_fields_rejects_typos() {
        let json = serde_json::json!({"providerz": []});
        let result: Result<ArenaConfig, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
