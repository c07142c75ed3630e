//! In-process state store: a pure `RwLock<HashMap<...>>` mapping, no
//! file flush. Grounded on `sessions::store::SessionStore`'s
//! `RwLock<HashMap<...>>` shape, retargeted from session bookkeeping to
//! conversation history and run results.

use std::collections::HashMap;

use arena_domain::result::RunResult;
use arena_domain::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{merge_record, ConversationRecord, StateStore};

pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, ConversationRecord>>,
    results: RwLock<HashMap<String, RunResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.conversations.read().get(conversation_id).cloned())
    }

    async fn save(&self, conversation_id: &str, record: ConversationRecord) -> Result<()> {
        let mut conversations = self.conversations.write();
        let existing = conversations.get(conversation_id);
        let merged = merge_record(existing, record);
        conversations.insert(conversation_id.to_string(), merged);
        Ok(())
    }

    async fn get_result(&self, run_id: &str) -> Result<Option<RunResult>> {
        Ok(self.results.read().get(run_id).cloned())
    }

    async fn save_result(&self, result: &RunResult) -> Result<()> {
        self.results
            .write()
            .insert(result.run_id.clone(), result.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_domain::message::Message;

    fn record(messages: Vec<Message>) -> ConversationRecord {
        ConversationRecord {
            messages,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn load_returns_none_for_unknown_conversation() {
        let store = InMemoryStore::new();
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = InMemoryStore::new();
        let rec = record(vec![Message::user("hi")]);
        store.save("c1", rec.clone()).await.unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn save_extends_prefix() {
        let store = InMemoryStore::new();
        store.save("c1", record(vec![Message::user("hi")])).await.unwrap();
        store
            .save("c1", record(vec![Message::user("hi"), Message::assistant("hello")]))
            .await
            .unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
    }

    #[tokio::test]
    async fn save_replaces_on_non_prefix() {
        let store = InMemoryStore::new();
        store.save("c1", record(vec![Message::user("hi")])).await.unwrap();
        store.save("c1", record(vec![Message::user("bye")])).await.unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "bye");
    }

    #[tokio::test]
    async fn result_roundtrips() {
        let store = InMemoryStore::new();
        let result = RunResult {
            run_id: "r1".into(),
            scenario_id: "s1".into(),
            provider_id: "p1".into(),
            region: "us".into(),
            messages: vec![],
            violations: vec![],
            cost: 0.0,
            prompt_tokens: 0,
            completion_tokens: 0,
            duration_ms: 0,
            start_time: chrono::Utc::now(),
            end_time: None,
            error: None,
            tool_stats: Default::default(),
            conversation_assertions: Default::default(),
            turn_assertions: HashMap::new(),
            pending_approval: false,
        };
        store.save_result(&result).await.unwrap();
        let loaded = store.get_result("r1").await.unwrap().unwrap();
        assert_eq!(loaded.scenario_id, "s1");
    }

    #[tokio::test]
    async fn close_is_a_noop() {
        let store = InMemoryStore::new();
        store.close().await.unwrap();
    }
}
