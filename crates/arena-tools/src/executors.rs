//! The three built-in executors, routed by `ToolDescriptor::mode`
//!.

use std::sync::Arc;
use std::time::Duration;

use arena_domain::tool::{ExecutionStatus, PendingInfo, ToolDescriptor, ToolExecutionResult};
use arena_domain::{Error, Result};
use arena_mcp_client::McpManager;
use async_trait::async_trait;
use serde_json::Value;

use crate::AsyncToolExecutor;

/// Returns the descriptor's `mock_result` verbatim. Deterministic.
///
/// A `mock_result` shaped as `{"__pending__": {...PendingInfo...}}`
/// yields a `pending` execution result instead of `complete`, so test
/// scenarios can exercise the HITL path without a live approval
/// mechanism.
pub struct MockExecutor;

#[async_trait]
impl AsyncToolExecutor for MockExecutor {
    async fn execute_async(&self, descriptor: &ToolDescriptor, _args: Value) -> Result<ToolExecutionResult> {
        let result = descriptor.mock_result.clone().unwrap_or(Value::Null);
        if let Some(pending_value) = result.get("__pending__") {
            let info: PendingInfo = serde_json::from_value(pending_value.clone())
                .map_err(|e| Error::ToolSchema { tool: descriptor.name.clone(), message: e.to_string() })?;
            return Ok(ToolExecutionResult::pending(info));
        }
        Ok(ToolExecutionResult::complete(result.to_string()))
    }
}

/// Marshals args per `descriptor.input_schema` (treated as opaque — no
/// structural validation), performs the configured HTTP call,
/// and applies `descriptor.timeout_ms` via `tokio::time::timeout`.
/// Grounded on `providers::openai_compat::OpenAiCompatProvider`'s
/// `reqwest::Client` + timeout-wrapper usage.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncToolExecutor for HttpExecutor {
    async fn execute_async(&self, descriptor: &ToolDescriptor, args: Value) -> Result<ToolExecutionResult> {
        let config = descriptor.http_config.as_ref().ok_or_else(|| Error::Tool {
            tool: descriptor.name.clone(),
            message: "mode=live requires http_config".into(),
        })?;

        let method = reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes()).map_err(|e| Error::Tool {
            tool: descriptor.name.clone(),
            message: format!("invalid HTTP method {}: {e}", config.method),
        })?;

        let mut builder = self.client.request(method, &config.url).json(&args);
        for (key, value) in &config.headers {
            builder = builder.header(key, value);
        }

        let timeout = Duration::from_millis(descriptor.timeout_ms);
        let response = tokio::time::timeout(timeout, builder.send()).await.map_err(|_| {
            Error::ToolTimeout {
                tool: descriptor.name.clone(),
                message: format!("HTTP call exceeded {}ms", descriptor.timeout_ms),
            }
        })?;

        let response = response.map_err(|e| Error::ToolTransport {
            tool: descriptor.name.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::ToolTransport {
            tool: descriptor.name.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(Error::Tool {
                tool: descriptor.name.clone(),
                message: format!("bad status {status}: {body}"),
            });
        }

        Ok(ToolExecutionResult::complete(body))
    }
}

/// Delegates to an `arena-mcp-client::McpManager` to perform a remote
/// `tools/call` over the tool-server protocol. Tools routed
/// through this executor must carry a `server_binding`.
pub struct ExternalServerExecutor {
    manager: Arc<McpManager>,
}

impl ExternalServerExecutor {
    pub fn new(manager: Arc<McpManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AsyncToolExecutor for ExternalServerExecutor {
    async fn execute_async(&self, descriptor: &ToolDescriptor, args: Value) -> Result<ToolExecutionResult> {
        let binding = descriptor.server_binding.as_ref().ok_or_else(|| Error::Tool {
            tool: descriptor.name.clone(),
            message: "mode=external_server requires server_binding".into(),
        })?;
        let remote_name = binding.remote_name.as_deref().unwrap_or(&descriptor.name);

        let timeout = Duration::from_millis(descriptor.timeout_ms);
        let call = self.manager.call_tool(&binding.server_id, remote_name, args);
        let result = tokio::time::timeout(timeout, call).await.map_err(|_| Error::ToolTimeout {
            tool: descriptor.name.clone(),
            message: format!("tool-server call exceeded {}ms", descriptor.timeout_ms),
        })?;

        match result {
            Ok(call_result) if call_result.is_error => Ok(ToolExecutionResult::failed(call_result.text())),
            Ok(call_result) => Ok(ToolExecutionResult::complete(call_result.text())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_domain::tool::ToolMode;

    fn descriptor(mock_result: Value) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_weather".into(),
            description: "weather lookup".into(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            mode: ToolMode::Mock,
            timeout_ms: 1000,
            mock_result: Some(mock_result),
            http_config: None,
            server_binding: None,
        }
    }

    #[tokio::test]
    async fn mock_executor_returns_configured_result() {
        let descriptor = descriptor(serde_json::json!({"temp": 72}));
        let result = MockExecutor.execute_async(&descriptor, serde_json::json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Complete);
        assert!(result.content.unwrap().contains("72"));
    }

    #[tokio::test]
    async fn mock_executor_returns_pending_when_configured() {
        let descriptor = descriptor(serde_json::json!({
            "__pending__": {
                "reason": "needs approval",
                "user_message": "approve this?",
                "original_args": {},
            }
        }));
        let result = MockExecutor.execute_async(&descriptor, serde_json::json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Pending);
        assert_eq!(result.pending_info.unwrap().reason, "needs approval");
    }

    #[tokio::test]
    async fn http_executor_requires_http_config() {
        let descriptor = descriptor(Value::Null);
        let err = HttpExecutor::new().execute_async(&descriptor, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }

    #[tokio::test]
    async fn external_server_executor_requires_server_binding() {
        let manager = Arc::new(McpManager::empty());
        let descriptor = descriptor(Value::Null);
        let err = ExternalServerExecutor::new(manager)
            .execute_async(&descriptor, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
