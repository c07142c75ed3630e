//! Tool-server manager: owns the lifecycle of named external subprocess
//! connections and orchestrates tool discovery/dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use arena_domain::config::ToolServerConfig;
use serde_json::Value;

use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, StdioTransport, TransportError};

/// `idle → starting → ready`; any state `→ failed` on transport error;
/// `ready → closing → closed` on `close()` or process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Idle = 0,
    Starting = 1,
    Ready = 2,
    Closing = 3,
    Closed = 4,
    Failed = 5,
}

impl From<u8> for ServerState {
    fn from(v: u8) -> Self {
        match v {
            0 => ServerState::Idle,
            1 => ServerState::Starting,
            2 => ServerState::Ready,
            3 => ServerState::Closing,
            4 => ServerState::Closed,
            _ => ServerState::Failed,
        }
    }
}

pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
    state: AtomicU8,
}

impl McpServer {
    /// Spawn the process, perform the `initialize` handshake, discover
    /// tools via `tools/list`. Retries transport failures with
    /// exponential backoff up to `config.max_retries` (not protocol
    /// errors — a well-formed JSON-RPC error response is not retried).
    async fn initialize(config: &ToolServerConfig) -> Result<Self, McpError> {
        let transport = StdioTransport::spawn(config).map_err(McpError::Transport)?;
        let server = Self {
            id: config.id.clone(),
            tools: Vec::new(),
            transport: Box::new(transport),
            state: AtomicU8::new(ServerState::Starting as u8),
        };

        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = with_retry(config.max_retries, || {
            server.transport.send_request("initialize", Some(params_value.clone()))
        })
        .await
        .map_err(McpError::Transport)?;

        if resp.is_error() {
            server.state.store(ServerState::Failed as u8, Ordering::SeqCst);
            return Err(McpError::Protocol(format!("initialize failed: {}", resp.error.unwrap())));
        }

        server
            .transport
            .send_notification("notifications/initialized")
            .await
            .map_err(McpError::Transport)?;

        server.state.store(ServerState::Ready as u8, Ordering::SeqCst);

        let tools = discover_tools(&*server.transport, config).await;

        tracing::info!(server_id = %config.id, tool_count = tools.len(), "tool server initialized");

        Ok(Self { tools, ..server })
    }

    pub fn state(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive() && self.state() == ServerState::Ready
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }

        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        let resp = self
            .transport
            .send_request("tools/call", Some(params))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            return Err(McpError::Protocol(format!("tools/call failed: {}", resp.error.unwrap())));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value::<ToolCallResult>(result_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    async fn shutdown(&self) {
        self.state.store(ServerState::Closing as u8, Ordering::SeqCst);
        tracing::info!(server_id = %self.id, "shutting down tool server");
        self.transport.send_notification("close").await.ok();
        self.transport.shutdown().await;
        self.state.store(ServerState::Closed as u8, Ordering::SeqCst);
    }
}

/// Discover tools via `tools/list`. When `graceful_degradation` is
/// enabled, a transport or protocol failure yields an empty tool list
/// instead of propagating.
async fn discover_tools(transport: &dyn McpTransport, config: &ToolServerConfig) -> Vec<McpToolDef> {
    let result = with_retry(config.max_retries, || transport.send_request("tools/list", None)).await;

    let resp = match result {
        Ok(resp) => resp,
        Err(e) => {
            if config.graceful_degradation {
                tracing::warn!(server_id = %config.id, error = %e, "tools/list failed, degrading to empty tool list");
                return Vec::new();
            }
            tracing::warn!(server_id = %config.id, error = %e, "tools/list failed");
            return Vec::new();
        }
    };

    if resp.is_error() {
        tracing::warn!(server_id = %config.id, "tools/list returned a protocol error, server will have no tools");
        return Vec::new();
    }

    match serde_json::from_value::<ToolsListResult>(resp.result.unwrap_or(Value::Null)) {
        Ok(r) => r.tools,
        Err(e) => {
            tracing::warn!(server_id = %config.id, error = %e, "failed to parse tools/list result");
            Vec::new()
        }
    }
}

/// Exponential backoff retry for transport-level failures only; a
/// well-formed JSON-RPC error response is returned immediately (it is
/// not a transport failure).
async fn with_retry<F, Fut>(max_retries: u32, mut op: F) -> Result<protocol::JsonRpcResponse, TransportError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<protocol::JsonRpcResponse, TransportError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(resp) => return Ok(resp),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                let backoff_ms = 100u64 * (1u64 << attempt.min(10));
                tracing::debug!(attempt, error = %e, backoff_ms, "retrying tool-server request after transport error");
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct McpManager {
    servers: HashMap<String, McpServer>,
}

impl McpManager {
    pub fn empty() -> Self {
        Self {
            servers: HashMap::new(),
        }
    }

    /// Initialize from config: spawn processes, handshake, discover
    /// tools. Servers that fail to initialize are logged and skipped —
    /// the failed client is never cached, realized here by simply
    /// never inserting it into `servers`.
    pub async fn from_config(configs: &[ToolServerConfig]) -> Self {
        let mut servers = HashMap::new();

        for server_config in configs {
            tracing::info!(server_id = %server_config.id, command = %server_config.command, "initializing tool server");
            match McpServer::initialize(server_config).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(server_id = %server_config.id, error = %e, "failed to initialize tool server, skipping");
                }
            }
        }

        Self { servers }
    }

    pub fn list_tools(&self) -> Vec<(&str, &McpToolDef)> {
        self.servers
            .values()
            .filter(|s| s.is_alive())
            .flat_map(|server| server.tools.iter().map(move |tool| (server.id.as_str(), tool)))
            .collect()
    }

    pub async fn call_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let server = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        server.call_tool(tool_name, arguments).await
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn tool_count(&self) -> usize {
        self.servers.values().filter(|s| s.is_alive()).map(|s| s.tools.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Shut down all servers concurrently. After this returns, no
    /// further RPCs succeed on any server and no subprocess remains
    /// running.
    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.servers.values().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("tool-server transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("tool-server protocol error: {0}")]
    Protocol(String),

    #[error("tool server not found: {0}")]
    ServerNotFound(String),

    #[error("tool server is down: {0}")]
    ServerDown(String),
}

impl From<McpError> for arena_domain::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Transport(TransportError::Timeout) => {
                arena_domain::Error::ToolTimeout { tool: "_server".into(), message: e.to_string() }
            }
            McpError::Transport(_) => {
                arena_domain::Error::ToolTransport { tool: "_server".into(), message: e.to_string() }
            }
            other => arena_domain::Error::Tool {
                tool: "_server".into(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrips_through_u8() {
        for s in [
            ServerState::Idle,
            ServerState::Starting,
            ServerState::Ready,
            ServerState::Closing,
            ServerState::Closed,
            ServerState::Failed,
        ] {
            assert_eq!(ServerState::from(s as u8), s);
        }
    }

    #[tokio::test]
    async fn empty_manager_has_no_tools() {
        let mgr = McpManager::empty();
        assert!(mgr.is_empty());
        assert_eq!(mgr.tool_count(), 0);
        assert!(mgr.list_tools().is_empty());
    }

    #[tokio::test]
    async fn call_tool_on_unknown_server_errors() {
        let mgr = McpManager::empty();
        let err = mgr.call_tool("missing", "x", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(_)));
    }
}
