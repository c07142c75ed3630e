//! Lifecycle event envelope published on the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunCompleted,
    RunFailed,
    TurnStarted,
    TurnCompleted,
    ToolCallStarted,
    ToolCallCompleted,
}

/// Published asynchronously; never persisted by the bus itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub conversation_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_type: EventType, run_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            run_id: run_id.into(),
            session_id: None,
            conversation_id: conversation_id.into(),
            data: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
