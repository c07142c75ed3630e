//! The context an assertion is evaluated against. The scenario engine
//! builds a turn-scoped context (this turn's assistant content and tool
//! calls) for turn assertions, and a conversation-scoped context (the
//! whole conversation's assistant content, tool calls, and final
//! workflow state) for conversation assertions.

use arena_domain::message::ToolCall;
use std::collections::HashMap;

/// Workflow progress, for scenarios driven by `Turn::WorkflowStep`
/// rather than fixed user input.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub current: Option<String>,
    /// States visited, in order, including the current one.
    pub history: Vec<String>,
    /// True once the workflow has reached a state with no outgoing
    /// events (`workflow_complete`).
    pub terminal: bool,
}

pub struct AssertionContext<'a> {
    pub response_text: &'a str,
    pub tool_calls: &'a [ToolCall],
    /// Validator name -> whether it recorded a failure, for
    /// `guardrail_triggered`.
    pub guardrail_failures: &'a HashMap<String, bool>,
    pub workflow: Option<&'a WorkflowState>,
}

impl<'a> AssertionContext<'a> {
    pub fn new(response_text: &'a str, tool_calls: &'a [ToolCall], guardrail_failures: &'a HashMap<String, bool>) -> Self {
        Self {
            response_text,
            tool_calls,
            guardrail_failures,
            workflow: None,
        }
    }

    pub fn with_workflow(mut self, workflow: &'a WorkflowState) -> Self {
        self.workflow = Some(workflow);
        self
    }
}
