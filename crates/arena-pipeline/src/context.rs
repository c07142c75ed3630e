//! `ExecutionContext`: in-flight state passed through the stage chain
//!. Owned exclusively by one pipeline execution; stages mutate it
//! behind a lock rather than threading it through channels, since most
//! stages need the whole accumulated conversation, not just the stream
//! element currently in flight.

use std::collections::HashMap;
use std::sync::Arc;

use arena_domain::event::Event;
use arena_domain::message::Message;
use arena_domain::provider::Usage;
use arena_domain::result::Violation;
use arena_domain::tool::PendingToolCall;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cancel::CancelToken;

/// Receives lifecycle events published during pipeline execution. The
/// concrete pub/sub event bus lives above this crate (it fans
/// out to observers the engine owns); `arena-pipeline` only needs
/// something to hand events to.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: Event) {}
}

/// Running total of cost and token usage for one pipeline execution.
#[derive(Debug, Clone, Default)]
pub struct CostAccumulator {
    pub total_cost: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
}

impl CostAccumulator {
    pub fn add(&mut self, cost: f64, usage: &Usage) {
        self.total_cost += cost;
        self.prompt_tokens += usage.prompt_tokens as u64;
        self.completion_tokens += usage.completion_tokens as u64;
        self.cached_tokens += usage.cached_prompt_tokens as u64;
    }
}

pub struct ExecutionContext {
    pub cancel: CancelToken,
    pub run_id: String,
    pub conversation_id: String,
    /// 1-based index of the turn this execution is processing.
    pub turn_index: u32,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, Value>,
    pub cost: CostAccumulator,
    pub pending_tool_calls: Vec<PendingToolCall>,
    pub violations: Vec<Violation>,
    /// Validator name -> whether it recorded a failure this turn, read
    /// by the `guardrail_triggered` assertion.
    pub guardrail_failures: HashMap<String, bool>,
    pub event_sink: Arc<dyn EventSink>,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, conversation_id: impl Into<String>, turn_index: u32) -> Self {
        Self {
            cancel: CancelToken::new(),
            run_id: run_id.into(),
            conversation_id: conversation_id.into(),
            turn_index,
            messages: Vec::new(),
            metadata: HashMap::new(),
            cost: CostAccumulator::default(),
            pending_tool_calls: Vec::new(),
            violations: Vec::new(),
            guardrail_failures: HashMap::new(),
            event_sink: Arc::new(NoopEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }
}

/// Shared handle to an [`ExecutionContext`]: one pipeline execution
/// owns it exclusively, but every stage's task needs a clonable
/// reference to lock briefly while it mutates shared state.
pub type SharedContext = Arc<Mutex<ExecutionContext>>;

pub fn shared(ctx: ExecutionContext) -> SharedContext {
    Arc::new(Mutex::new(ctx))
}
