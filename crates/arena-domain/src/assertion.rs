//! Assertion data model. Evaluation logic lives in `arena-assert`;
//! this crate only owns the shared, serializable shapes so `Scenario` and
//! `RunResult` can both reference them without a circular dependency.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionScope {
    Turn,
    Conversation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub scope: AssertionScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub passed: bool,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AssertionResult {
    pub fn pass(kind: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            passed: true,
            details,
            message: None,
        }
    }

    pub fn fail(kind: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            passed: false,
            details,
            message: None,
        }
    }

    pub fn error(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            passed: false,
            details: serde_json::json!({ "error": error.into() }),
            message: None,
        }
    }
}
