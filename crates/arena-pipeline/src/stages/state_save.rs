//! State-Save stage: persists the updated message sequence and
//! metadata back through the state store. Runs after the Provider
//! stage so a pending tool call's intermediate conversation round-trips
//! through save/load unchanged.

use std::sync::Arc;

use arena_domain::Result;
use arena_state::{ConversationRecord, StateStore};
use async_trait::async_trait;

use crate::context::SharedContext;
use crate::stage::{passthrough, ElementReceiver, ElementSender, Stage, StageKind};

pub struct StateSaveStage {
    store: Arc<dyn StateStore>,
}

impl StateSaveStage {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for StateSaveStage {
    fn name(&self) -> &str {
        "state-save"
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    async fn process(&self, ctx: &SharedContext, input: &mut ElementReceiver, output: &ElementSender) -> Result<()> {
        let (conversation_id, messages, metadata, cancel) = {
            let guard = ctx.lock().await;
            (
                guard.conversation_id.clone(),
                guard.messages.clone(),
                guard.metadata.clone(),
                guard.cancel.clone(),
            )
        };

        self.store
            .save(&conversation_id, ConversationRecord { messages, metadata })
            .await?;

        passthrough(input, output, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::element::StreamElement;
    use arena_domain::message::Message;
    use arena_state::InMemoryStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn persists_messages_and_metadata() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let ctx = crate::context::shared(ExecutionContext::new("r1", "conv-1", 1));
        {
            let mut guard = ctx.lock().await;
            guard.messages.push(Message::user("hi"));
            guard.metadata.insert("task_type".into(), serde_json::json!("chat"));
        }

        let stage = StateSaveStage::new(store.clone());
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        in_tx.send(StreamElement::text("seed")).await.unwrap();
        drop(in_tx);
        stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap();
        drop(out_tx);
        assert!(out_rx.recv().await.is_some());

        let record = store.load("conv-1").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.metadata.get("task_type").unwrap(), "chat");
    }
}
