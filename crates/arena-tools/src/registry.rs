//! `ToolRegistry`: a `RwLock<HashMap<...>>` catalog of tool descriptors
//! plus one executor per `ToolMode`, grounded on
//! `tools::manager::ProcessManager`'s registry shape.

use std::collections::HashMap;
use std::sync::Arc;

use arena_domain::tool::{ToolDescriptor, ToolExecutionResult, ToolMode};
use arena_domain::{Error, Result};
use parking_lot::RwLock;
use serde_json::Value;

use crate::AsyncToolExecutor;

pub struct ToolRegistry {
    descriptors: RwLock<HashMap<String, ToolDescriptor>>,
    executors: RwLock<HashMap<ToolMode, Arc<dyn AsyncToolExecutor>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            executors: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, descriptor: ToolDescriptor) {
        self.descriptors.write().insert(descriptor.name.clone(), descriptor);
    }

    pub fn register_executor(&self, mode: ToolMode, executor: Arc<dyn AsyncToolExecutor>) {
        self.executors.write().insert(mode, executor);
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.descriptors.read().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.descriptors.read().get(name).cloned()
    }

    /// Execute a tool by name, returning its output content or an
    /// error — callers that only want the synchronous "did it
    /// succeed" view should use this over `execute_async`.
    pub async fn execute(&self, name: &str, args: Value) -> Result<String> {
        match self.execute_async(name, args).await? {
            ToolExecutionResult { status: arena_domain::tool::ExecutionStatus::Complete, content, .. } => {
                Ok(content.unwrap_or_default())
            }
            ToolExecutionResult { status: arena_domain::tool::ExecutionStatus::Failed, error, .. } => {
                Err(Error::Tool { tool: name.to_string(), message: error.unwrap_or_default() })
            }
            ToolExecutionResult { status: arena_domain::tool::ExecutionStatus::Pending, .. } => Err(Error::Tool {
                tool: name.to_string(),
                message: "tool execution is pending external approval".into(),
            }),
        }
    }

    /// Execute a tool by name through the async/pending-aware path,
    /// routing by the descriptor's `mode` to the registered executor
    ///.
    pub async fn execute_async(&self, name: &str, args: Value) -> Result<ToolExecutionResult> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| Error::Tool { tool: name.to_string(), message: "no such tool registered".into() })?;

        let executor = self
            .executors
            .read()
            .get(&descriptor.mode)
            .cloned()
            .ok_or_else(|| Error::Tool {
                tool: name.to_string(),
                message: format!("no executor registered for mode {:?}", descriptor.mode),
            })?;

        executor.execute_async(&descriptor, args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
