//! State-Load stage: loads prior conversation history,
//! marks it `from_history`, and prepends it to the in-flight messages.

use std::sync::Arc;

use arena_domain::Result;
use arena_state::StateStore;
use async_trait::async_trait;

use crate::context::SharedContext;
use crate::stage::{passthrough, ElementReceiver, ElementSender, Stage, StageKind};

pub struct StateLoadStage {
    store: Arc<dyn StateStore>,
}

impl StateLoadStage {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for StateLoadStage {
    fn name(&self) -> &str {
        "state-load"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &SharedContext, input: &mut ElementReceiver, output: &ElementSender) -> Result<()> {
        let (conversation_id, cancel) = {
            let guard = ctx.lock().await;
            (guard.conversation_id.clone(), guard.cancel.clone())
        };

        let record = self.store.load(&conversation_id).await?;

        if let Some(record) = record {
            let mut guard = ctx.lock().await;
            let mut history = record.messages;
            for message in &mut history {
                message.mark_from_history();
            }
            history.append(&mut guard.messages);
            guard.messages = history;
            for (key, value) in record.metadata {
                guard.metadata.entry(key).or_insert(value);
            }
        }

        passthrough(input, output, &cancel).await
    }
}
