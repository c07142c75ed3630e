//! Deterministic mock provider. Reads a response keyed by
//! `(scenario_id, turn_index)`, falling back to a scenario-level then
//! global default; preserves `tool_calls` shape exactly as authored.
//! Used by the engine for reproducible test runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use arena_domain::message::ToolCall;
use arena_domain::provider::{BoxStream, ChatRequest, ChatResponse, FinishReason, StreamChunk, Usage};
use arena_domain::Result;
use serde::{Deserialize, Serialize};

use crate::traits::LlmProvider;

/// One turn's configured response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockTurnConfig {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Per-scenario mock configuration: one entry per 1-based turn index,
/// plus a scenario-level fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockScenarioConfig {
    #[serde(default)]
    pub default_response: Option<String>,
    #[serde(default)]
    pub turns: HashMap<u32, MockTurnConfig>,
}

/// The full mock configuration file: `{default_response?,
/// scenarios: map<scenario_id, MockScenarioConfig>}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub default_response: Option<String>,
    #[serde(default)]
    pub scenarios: HashMap<String, MockScenarioConfig>,
}

impl MockConfig {
    /// Merge `other` into `self`, scenario-by-scenario and turn-by-turn,
    /// so a recorder can append newly recorded runs into an existing mock
    /// config file without clobbering entries for scenarios it didn't
    /// touch.
    pub fn merge(&mut self, other: MockConfig) {
        if other.default_response.is_some() {
            self.default_response = other.default_response;
        }
        for (scenario_id, scenario) in other.scenarios {
            let entry = self.scenarios.entry(scenario_id).or_default();
            if scenario.default_response.is_some() {
                entry.default_response = scenario.default_response;
            }
            entry.turns.extend(scenario.turns);
        }
    }
}

const STUB_RESPONSE: &str = "[mock provider: no configured response for this scenario/turn]";

/// A provider that never calls out to a network, returning deterministic
/// responses from a [`MockConfig`] instead. Every turn it serves is
/// counted so tests can assert on call volume.
pub struct MockProvider {
    id: String,
    config: MockConfig,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: impl Into<String>, config: MockConfig) -> Self {
        Self {
            id: id.into(),
            config,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls_served(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Resolve the configured response for a scenario/turn, falling
    /// through scenario-level then global defaults. Returns the resolved
    /// `(text, tool_calls)` pair, or the non-fatal stub when nothing
    /// matches.
    fn resolve(&self, scenario_id: &str, turn_index: u32) -> (String, Vec<ToolCall>) {
        if let Some(scenario) = self.config.scenarios.get(scenario_id) {
            if let Some(turn) = scenario.turns.get(&turn_index) {
                let text = turn.response.clone().or_else(|| scenario.default_response.clone());
                if text.is_some() || turn.tool_calls.is_some() {
                    return (
                        text.or_else(|| self.config.default_response.clone()).unwrap_or_default(),
                        turn.tool_calls.clone().unwrap_or_default(),
                    );
                }
            }
            if let Some(default) = &scenario.default_response {
                return (default.clone(), Vec::new());
            }
        }
        if let Some(default) = &self.config.default_response {
            return (default.clone(), Vec::new());
        }
        (STUB_RESPONSE.to_string(), Vec::new())
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let scenario_id = req
            .parameters
            .get("__scenario_id")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let turn_index = req
            .parameters
            .get("__turn_index")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        let (content, tool_calls) = self.resolve(scenario_id, turn_index);
        let finish_reason = if tool_calls.is_empty() { FinishReason::Stop } else { FinishReason::ToolCalls };

        Ok(ChatResponse {
            content,
            tool_calls,
            cost: 0.0,
            latency_ms: 0,
            finish_reason,
            usage: Usage::default(),
        })
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let response = self.chat(req).await?;
        let chunk = StreamChunk {
            delta: Some(response.content.clone()),
            content: Some(response.content),
            tool_calls: if response.tool_calls.is_empty() { None } else { Some(response.tool_calls) },
            media_delta: None,
            tool_call_done: None,
            finish_reason: Some(response.finish_reason),
            usage: Some(response.usage),
        };
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(chunk)])))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn calculate_cost(&self, _input_tokens: u32, _output_tokens: u32, _cached_tokens: u32) -> f64 {
        0.0
    }

    async fn close(&self) {}
}
