//! Tool descriptor and execution result types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    Mock,
    Live,
    ExternalServer,
}

/// Describes a callable tool. Shared read-only after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub mode: ToolMode,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_config: Option<HttpToolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_binding: Option<ServerBinding>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpToolConfig {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Identifies which named external tool-server instance backs an
/// `external_server` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerBinding {
    pub server_id: String,
    /// The tool's name as advertised by the server, if different from
    /// `ToolDescriptor::name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Complete,
    Pending,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInfo {
    pub reason: String,
    pub user_message: String,
    pub original_args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_hint: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_info: Option<PendingInfo>,
}

impl ToolExecutionResult {
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Complete,
            content: Some(content.into()),
            error: None,
            pending_info: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            content: None,
            error: Some(error.into()),
            pending_info: None,
        }
    }

    pub fn pending(info: PendingInfo) -> Self {
        Self {
            status: ExecutionStatus::Pending,
            content: None,
            error: None,
            pending_info: Some(info),
        }
    }
}

/// A tool call recorded as pending, awaiting external approval/input.
/// Tracked on the `ExecutionContext` and persisted by State-Save so a
/// later `load` returns the same in-flight state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub pending_info: PendingInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_deserializes_minimal() {
        let json = serde_json::json!({
            "name": "get_weather",
            "description": "weather lookup",
            "input_schema": {"type": "object"},
            "mode": "mock",
        });
        let d: ToolDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(d.timeout_ms, 30_000);
        assert_eq!(d.mode, ToolMode::Mock);
    }

    #[test]
    fn execution_result_constructors() {
        assert_eq!(
            ToolExecutionResult::complete("ok").status,
            ExecutionStatus::Complete
        );
        assert_eq!(
            ToolExecutionResult::failed("boom").status,
            ExecutionStatus::Failed
        );
    }
}
