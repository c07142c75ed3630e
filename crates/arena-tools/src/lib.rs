//! Tool registry & executors: describes callable tools and
//! routes invocations by the descriptor's `mode` to the matching
//! executor — mock, live HTTP, or external tool-server.

mod executors;
mod registry;

pub use executors::{ExternalServerExecutor, HttpExecutor, MockExecutor};
pub use registry::ToolRegistry;

use arena_domain::tool::{ToolDescriptor, ToolExecutionResult};
use arena_domain::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Synchronous tool executor: returns raw output bytes (as a UTF-8
/// string) or an error. Preferred by callers that don't need the
/// pending/HITL path.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, descriptor: &ToolDescriptor, args: Value) -> Result<String>;
}

/// Async tool executor: returns the full `ToolExecutionResult`,
/// including the `pending` status for human-in-the-loop tools. When
/// both traits are implemented by the same executor, the registry
/// prefers this path when the caller requires async semantics.
#[async_trait]
pub trait AsyncToolExecutor: Send + Sync {
    async fn execute_async(&self, descriptor: &ToolDescriptor, args: Value) -> Result<ToolExecutionResult>;
}

/// Bridges a sync `ToolExecutor` into the `AsyncToolExecutor` interface
/// the registry actually dispatches through; the result is always
/// `complete` or `failed`, never `pending` (only descriptor-aware
/// executors like `MockExecutor` can originate a pending status).
pub async fn execute_sync_as_async(
    executor: &dyn ToolExecutor,
    descriptor: &ToolDescriptor,
    args: Value,
) -> Result<ToolExecutionResult> {
    match executor.execute(descriptor, args).await {
        Ok(content) => Ok(ToolExecutionResult::complete(content)),
        Err(e) => Ok(ToolExecutionResult::failed(e.to_string())),
    }
}
