//! Prompt-Assembly stage: resolves the prompt template for
//! the scenario's task type and stages everything the later Template,
//! Validation, and Provider stages need — the raw system template,
//! permitted tool names, and validator configs — into execution
//! metadata.

use std::collections::HashMap;

use arena_domain::config::PromptConfig;
use arena_domain::Result;
use async_trait::async_trait;

use crate::context::SharedContext;
use crate::stage::{passthrough, ElementReceiver, ElementSender, Stage, StageKind};

pub struct PromptAssemblyStage {
    configs: HashMap<String, PromptConfig>,
}

impl PromptAssemblyStage {
    pub fn new(configs: Vec<PromptConfig>) -> Self {
        let configs = configs.into_iter().map(|c| (c.task_type.clone(), c)).collect();
        Self { configs }
    }
}

#[async_trait]
impl Stage for PromptAssemblyStage {
    fn name(&self) -> &str {
        "prompt-assembly"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &SharedContext, input: &mut ElementReceiver, output: &ElementSender) -> Result<()> {
        let cancel = { ctx.lock().await.cancel.clone() };

        let task_type = {
            let guard = ctx.lock().await;
            guard
                .metadata
                .get("task_type")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        if let Some(task_type) = task_type.as_deref() {
            if let Some(config) = self.configs.get(task_type) {
                let permitted_tools: Vec<String> = config.tools.iter().map(|t| t.name.clone()).collect();
                let mut guard = ctx.lock().await;
                guard
                    .metadata
                    .insert("system_template_raw".to_string(), serde_json::json!(config.system_template));
                guard
                    .metadata
                    .insert("permitted_tools".to_string(), serde_json::json!(permitted_tools));
                guard
                    .metadata
                    .insert("validators".to_string(), serde_json::to_value(&config.validators).unwrap_or_default());
                guard
                    .metadata
                    .insert("prompt_parameters".to_string(), serde_json::to_value(&config.parameters).unwrap_or_default());
            } else {
                tracing::debug!(task_type, "no prompt config registered for task type");
            }
        }

        passthrough(input, output, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::element::StreamElement;
    use arena_domain::config::ValidatorConfig;
    use arena_domain::tool::{ToolDescriptor, ToolMode};
    use tokio::sync::mpsc;

    fn prompt_config() -> PromptConfig {
        PromptConfig {
            task_type: "chat".into(),
            system_template: "You are {{persona}}.".into(),
            parameters: HashMap::new(),
            tools: vec![ToolDescriptor {
                name: "get_weather".into(),
                description: "weather".into(),
                input_schema: serde_json::json!({"type": "object"}),
                output_schema: None,
                mode: ToolMode::Mock,
                timeout_ms: 1000,
                mock_result: None,
                http_config: None,
                server_binding: None,
            }],
            validators: vec![ValidatorConfig::BannedWords { words: vec!["damn".into()] }],
            media: Default::default(),
        }
    }

    #[tokio::test]
    async fn resolves_config_by_task_type() {
        let stage = PromptAssemblyStage::new(vec![prompt_config()]);
        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        ctx.lock().await.metadata.insert("task_type".into(), serde_json::json!("chat"));

        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        in_tx.send(StreamElement::text("seed")).await.unwrap();
        drop(in_tx);
        stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap();

        let guard = ctx.lock().await;
        assert_eq!(
            guard.metadata.get("system_template_raw").unwrap().as_str().unwrap(),
            "You are {{persona}}."
        );
        let permitted: Vec<String> = serde_json::from_value(guard.metadata.get("permitted_tools").unwrap().clone()).unwrap();
        assert_eq!(permitted, vec!["get_weather".to_string()]);
    }

    #[tokio::test]
    async fn unknown_task_type_is_a_noop() {
        let stage = PromptAssemblyStage::new(vec![prompt_config()]);
        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        ctx.lock().await.metadata.insert("task_type".into(), serde_json::json!("unknown"));
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        drop(in_tx);
        stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap();
        assert!(!ctx.lock().await.metadata.contains_key("system_template_raw"));
    }
}
