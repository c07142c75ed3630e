//! State store: durable home for conversation history and run
//! results. Two back ends share the same `StateStore` contract — an
//! in-process map and an out-of-process string-keyed cache.

mod in_memory;
mod out_of_process;

pub use in_memory::InMemoryStore;
pub use out_of_process::{CacheBackend, InMemoryCacheBackend, OutOfProcessStore};

use arena_domain::result::RunResult;
use arena_domain::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata stored alongside a conversation's messages.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A conversation's persisted content: the message history plus
/// free-form metadata (e.g. pending tool calls survive here).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub messages: Vec<arena_domain::message::Message>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Durable home for conversation history and run results.
///
/// `load` MUST return the last durably saved set. `save` is
/// append-safe: if the stored sequence is a proper prefix of the
/// provided one, it is extended; otherwise the stored sequence is
/// replaced outright (last-writer-wins within a single run). The
/// engine guarantees a unique `conversation_id` per run, so no
/// explicit lock is required at this layer for cross-writer safety.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationRecord>>;
    async fn save(&self, conversation_id: &str, record: ConversationRecord) -> Result<()>;
    async fn get_result(&self, run_id: &str) -> Result<Option<RunResult>>;
    async fn save_result(&self, result: &RunResult) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// True when `existing` is a proper prefix of `incoming` (by message
/// count and pointwise content equality) — the append-safety check
/// shared by both back ends.
pub(crate) fn is_prefix(existing: &[arena_domain::message::Message], incoming: &[arena_domain::message::Message]) -> bool {
    if existing.len() > incoming.len() {
        return false;
    }
    existing
        .iter()
        .zip(incoming.iter())
        .all(|(a, b)| messages_equal(a, b))
}

fn messages_equal(a: &arena_domain::message::Message, b: &arena_domain::message::Message) -> bool {
    serde_json::to_value(a).ok() == serde_json::to_value(b).ok()
}

/// Apply the append-safety contract: the incoming record always wins
/// (callers always pass the full accumulated message sequence), but a
/// non-prefix incoming sequence against an existing record is logged —
/// it indicates a same-conversation-id collision the engine's
/// unique-run-id guarantee should have prevented.
pub(crate) fn merge_record(existing: Option<&ConversationRecord>, incoming: ConversationRecord) -> ConversationRecord {
    if let Some(existing) = existing {
        if !is_prefix(&existing.messages, &incoming.messages) {
            tracing::warn!(
                existing_len = existing.messages.len(),
                incoming_len = incoming.messages.len(),
                "state store save: incoming sequence is not an extension of the stored one, replacing"
            );
        }
    }
    incoming
}

pub fn unavailable(context: impl Into<String>) -> Error {
    Error::Unavailable(context.into())
}
