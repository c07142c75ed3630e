//! `StreamElement`: the unit that flows between stages.
//!
//! Carries one of text, typed media, a full message, a tool call, an
//! ordered parts list, or an error, plus a metadata map and a priority
//! used when the pipeline runs in priority-queue mode.

use std::collections::HashMap;

use arena_domain::message::{ContentPart, Message, ToolCall};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Image,
    Document,
    Raw,
}

#[derive(Debug, Clone)]
pub struct MediaFragment {
    pub kind: MediaKind,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// An error surfaced through the stream as data rather than an `Err`
/// return — a "soft" error, left for a downstream stage (or the
/// caller draining `execute_sync`) to decide what to do with.
#[derive(Debug, Clone)]
pub struct ElementError {
    pub message: String,
    pub recoverable: bool,
}

#[derive(Debug, Clone)]
pub enum ElementPayload {
    Text(String),
    Media(MediaFragment),
    Message(Message),
    ToolCall(ToolCall),
    Parts(Vec<ContentPart>),
    Error(ElementError),
}

#[derive(Debug, Clone)]
pub struct StreamElement {
    pub payload: ElementPayload,
    pub metadata: HashMap<String, Value>,
    pub priority: i32,
}

impl StreamElement {
    fn wrap(payload: ElementPayload) -> Self {
        Self {
            payload,
            metadata: HashMap::new(),
            priority: 0,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::wrap(ElementPayload::Text(text.into()))
    }

    pub fn media(kind: MediaKind, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::wrap(ElementPayload::Media(MediaFragment {
            kind,
            mime_type: mime_type.into(),
            bytes,
        }))
    }

    pub fn message(message: Message) -> Self {
        Self::wrap(ElementPayload::Message(message))
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::wrap(ElementPayload::ToolCall(call))
    }

    pub fn parts(parts: Vec<ContentPart>) -> Self {
        Self::wrap(ElementPayload::Parts(parts))
    }

    pub fn error(message: impl Into<String>, recoverable: bool) -> Self {
        Self::wrap(ElementPayload::Error(ElementError {
            message: message.into(),
            recoverable,
        }))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            ElementPayload::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ElementPayload::Error(_))
    }
}
