//! Scenario and provider configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub task: TaskRef,
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub assertions: Vec<crate::assertion::Assertion>,
}

/// Either a named task type (resolved by Prompt-Assembly) or a direct
/// pack reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRef {
    TaskType(String),
    PackRef(String),
}

/// A turn is either a fixed user input or a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserInput {
        text: String,
        #[serde(default)]
        media: Vec<crate::message::ContentPart>,
        #[serde(default)]
        assertions: Vec<crate::assertion::Assertion>,
    },
    WorkflowStep {
        event: String,
        #[serde(default)]
        input: serde_json::Value,
        #[serde(default)]
        assertions: Vec<crate::assertion::Assertion>,
    },
}

impl Turn {
    pub fn assertions(&self) -> &[crate::assertion::Assertion] {
        match self {
            Turn::UserInput { assertions, .. } => assertions,
            Turn::WorkflowStep { assertions, .. } => assertions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub vendor_tag: String,
    pub model: String,
    pub region: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub auth_env_key: String,
    #[serde(default)]
    pub pricing: ModelPricing,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input_per_1m: f64,
    #[serde(default)]
    pub output_per_1m: f64,
    #[serde(default)]
    pub cached_input_per_1m: f64,
}

impl ModelPricing {
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32, cached_tokens: u32) -> f64 {
        let billable_input = input_tokens.saturating_sub(cached_tokens);
        (billable_input as f64 * self.input_per_1m
            + cached_tokens as f64 * self.cached_input_per_1m
            + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_accounts_for_cached_tokens() {
        let pricing = ModelPricing {
            input_per_1m: 3.0,
            output_per_1m: 15.0,
            cached_input_per_1m: 0.3,
        };
        let cost = pricing.calculate_cost(1000, 500, 200);
        // (800 * 3 + 200 * 0.3 + 500 * 15) / 1_000_000
        let expected = (800.0 * 3.0 + 200.0 * 0.3 + 500.0 * 15.0) / 1_000_000.0;
        assert!((cost - expected).abs() < 1e-12);
    }

    #[test]
    fn scenario_turn_roundtrips() {
        let json = serde_json::json!({
            "id": "s1",
            "task_type": "chat",
            "turns": [
                {"kind": "user_input", "text": "Hello!"}
            ],
            "assertions": [],
        });
        let s: Scenario = serde_json::from_value(json).unwrap();
        assert_eq!(s.turns.len(), 1);
        match &s.task {
            TaskRef::TaskType(t) => assert_eq!(t, "chat"),
            _ => panic!("expected task_type"),
        }
    }
}
