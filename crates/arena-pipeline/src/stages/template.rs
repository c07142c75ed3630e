//! Template stage: substitutes `{{variable}}` placeholders
//! in the assembled system prompt and the latest user message.

use std::collections::HashMap;

use arena_domain::message::{Message, Role};
use arena_domain::Result;
use async_trait::async_trait;
use regex::Regex;

use crate::context::SharedContext;
use crate::stage::{passthrough, ElementReceiver, ElementSender, Stage, StageKind};

/// Resolves a named template variable against whatever data source a
/// caller plugs in (scenario turn variables, environment, a fixed map).
/// Tried in the order passed to [`TemplateStage::new`]; the first
/// provider to return `Some` wins.
pub trait VariableProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

pub struct StaticVariableProvider(HashMap<String, String>);

impl StaticVariableProvider {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self(vars)
    }
}

impl VariableProvider for StaticVariableProvider {
    fn resolve(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

fn placeholder_re() -> Regex {
    Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("static regex is valid")
}

pub struct TemplateStage {
    providers: Vec<Box<dyn VariableProvider>>,
}

impl TemplateStage {
    pub fn new(providers: Vec<Box<dyn VariableProvider>>) -> Self {
        Self { providers }
    }

    fn substitute(&self, input: &str, extra: &HashMap<String, String>) -> String {
        let re = placeholder_re();
        re.replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            for provider in &self.providers {
                if let Some(value) = provider.resolve(name) {
                    return value;
                }
            }
            extra.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
    }
}

#[async_trait]
impl Stage for TemplateStage {
    fn name(&self) -> &str {
        "template"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &SharedContext, input: &mut ElementReceiver, output: &ElementSender) -> Result<()> {
        let cancel = { ctx.lock().await.cancel.clone() };
        let mut guard = ctx.lock().await;

        let extra: HashMap<String, String> = guard
            .metadata
            .get("prompt_parameters")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(raw) = guard.metadata.get("system_template_raw").and_then(|v| v.as_str()) {
            let rendered = self.substitute(raw, &extra);
            let has_system = guard.messages.first().map(|m| m.role == Role::System).unwrap_or(false);
            if has_system {
                guard.messages[0].content = rendered;
            } else {
                guard.messages.insert(0, Message::system(rendered));
            }
        }

        if let Some(last_user) = guard.messages.iter_mut().filter(|m| m.role == Role::User).last() {
            last_user.content = self.substitute(&last_user.content.clone(), &extra);
        }

        drop(guard);
        passthrough(input, output, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::element::StreamElement;
    use tokio::sync::mpsc;

    async fn run(stage: &TemplateStage, ctx: &SharedContext) {
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        in_tx.send(StreamElement::text("seed")).await.unwrap();
        drop(in_tx);
        stage.process(ctx, &mut in_rx, &out_tx).await.unwrap();
    }

    #[tokio::test]
    async fn substitutes_from_static_provider() {
        let mut vars = HashMap::new();
        vars.insert("persona".to_string(), "a helpful assistant".to_string());
        let stage = TemplateStage::new(vec![Box::new(StaticVariableProvider::new(vars))]);

        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        {
            let mut guard = ctx.lock().await;
            guard
                .metadata
                .insert("system_template_raw".into(), serde_json::json!("You are {{persona}}."));
            guard.messages.push(Message::user("Hello {{persona}}"));
        }

        run(&stage, &ctx).await;

        let guard = ctx.lock().await;
        assert_eq!(guard.messages[0].content, "You are a helpful assistant.");
        assert_eq!(guard.messages[1].content, "Hello a helpful assistant");
    }

    #[tokio::test]
    async fn unresolved_placeholder_becomes_empty() {
        let stage = TemplateStage::new(vec![]);
        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        {
            let mut guard = ctx.lock().await;
            guard
                .metadata
                .insert("system_template_raw".into(), serde_json::json!("Hello {{unknown}}!"));
        }
        run(&stage, &ctx).await;
        assert_eq!(ctx.lock().await.messages[0].content, "Hello !");
    }

    #[tokio::test]
    async fn prompt_parameters_fallback_before_empty() {
        let stage = TemplateStage::new(vec![]);
        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        {
            let mut guard = ctx.lock().await;
            guard
                .metadata
                .insert("system_template_raw".into(), serde_json::json!("Region: {{region}}"));
            guard
                .metadata
                .insert("prompt_parameters".into(), serde_json::json!({"region": "us-east"}));
        }
        run(&stage, &ctx).await;
        assert_eq!(ctx.lock().await.messages[0].content, "Region: us-east");
    }
}
