//! Conversation message model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation entry.
///
/// Invariant: a message with `role == Role::Tool` must carry a
/// `tool_result` whose `id` matches a `ToolCall.id` previously emitted in
/// an earlier assistant message's `tool_calls`. This is checked by
/// callers that append tool-result messages (the pipeline's Provider
/// stage), not by `Message` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<ContentPart>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An ordered, typed content fragment. Each media variant carries either
/// inline bytes (base64-encoded in JSON) or an external reference, never
/// both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { media: MediaRef },
    Audio { media: MediaRef },
    Video { media: MediaRef },
    Document { media: MediaRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaRef {
    Inline {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        mime_type: String,
    },
    External {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

/// An assistant-initiated tool invocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Opaque JSON arguments — structured map or raw string, never partial.
    pub args: serde_json::Value,
}

/// The outcome of a tool call, carried on a `role: tool` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            parts: None,
            tool_calls: Some(tool_calls),
            tool_result: None,
            metadata: HashMap::new(),
        }
    }

    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            role: Role::Tool,
            content: String::new(),
            parts: None,
            tool_calls: None,
            tool_result: Some(ToolResult {
                id,
                name: name.into(),
                content: Some(content.into()),
                error: None,
            }),
            metadata: HashMap::new(),
        }
    }

    pub fn tool_error(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            role: Role::Tool,
            content: String::new(),
            parts: None,
            tool_calls: None,
            tool_result: Some(ToolResult {
                id,
                name: name.into(),
                content: None,
                error: Some(error.into()),
            }),
            metadata: HashMap::new(),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            parts: None,
            tool_calls: None,
            tool_result: None,
            metadata: HashMap::new(),
        }
    }

    /// Mark this message as loaded from prior conversation history, per
    /// the State-Load stage's contract.
    pub fn mark_from_history(&mut self) {
        self.metadata
            .insert("from_history".to_string(), serde_json::Value::Bool(true));
    }

    pub fn is_from_history(&self) -> bool {
        matches!(
            self.metadata.get("from_history"),
            Some(serde_json::Value::Bool(true))
        )
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_message_carries_matching_id() {
        let assistant = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "call-1".into(),
                name: "get_weather".into(),
                args: serde_json::json!({"city": "SF"}),
            }],
        );
        let tool_msg = Message::tool_result("call-1", "get_weather", "{\"temp\":72}");
        let call_id = &assistant.tool_calls.unwrap()[0].id;
        assert_eq!(call_id, &tool_msg.tool_result.unwrap().id);
    }

    #[test]
    fn serde_roundtrip_preserves_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "checking weather",
            vec![ToolCall {
                id: "c1".into(),
                name: "get_weather".into(),
                args: serde_json::json!({"city": "SF"}),
            }],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.unwrap()[0].name, "get_weather");
    }

    #[test]
    fn from_history_metadata_roundtrips() {
        let mut msg = Message::user("hi");
        assert!(!msg.is_from_history());
        msg.mark_from_history();
        assert!(msg.is_from_history());
    }

    #[test]
    fn inline_media_part_roundtrips_through_base64() {
        let part = ContentPart::Image {
            media: MediaRef::Inline {
                bytes: b"not really a png".to_vec(),
                mime_type: "image/png".into(),
            },
        };
        let json = serde_json::to_string(&part).unwrap();
        let back: ContentPart = serde_json::from_str(&json).unwrap();
        let ContentPart::Image { media: MediaRef::Inline { bytes, .. } } = back else {
            panic!("expected inline image part");
        };
        assert_eq!(bytes, b"not really a png");
    }
}
