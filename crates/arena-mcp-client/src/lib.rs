//! Tool-server client: spawns/connects to an external subprocess that
//! exposes tools over newline-delimited JSON-RPC 2.0 on stdio, and
//! manages its lifecycle.

pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{McpError, McpManager, McpServer, ServerState};
pub use protocol::McpToolDef;
