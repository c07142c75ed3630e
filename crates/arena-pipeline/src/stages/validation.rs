//! Validation stage: runs the scenario's
//! validators against the latest message in-flight. In `Test` mode a
//! triggered validator is recorded as a [`Violation`] and the turn
//! continues (the `guardrail_triggered` assertion reads it back later);
//! in `Production` mode a triggered validator is a hard error that
//! cancels the pipeline.

use arena_domain::config::ValidatorConfig;
use arena_domain::result::Violation;
use arena_domain::{Error, Result};
use async_trait::async_trait;

use crate::context::SharedContext;
use crate::stage::{passthrough, ElementReceiver, ElementSender, Stage, StageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Test,
    Production,
}

pub struct ValidationStage {
    mode: ValidationMode,
}

impl ValidationStage {
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    fn check(validator: &ValidatorConfig, text: &str) -> Option<Violation> {
        match validator {
            ValidatorConfig::BannedWords { words } => {
                let lower = text.to_lowercase();
                let hit = words.iter().find(|w| lower.contains(&w.to_lowercase()));
                hit.map(|word| Violation {
                    validator: "banned_words".into(),
                    message: format!("banned word found: {word}"),
                    details: serde_json::json!({"word": word}),
                })
            }
            ValidatorConfig::MaxLength { max_chars } => {
                if text.chars().count() > *max_chars {
                    Some(Violation {
                        validator: "max_length".into(),
                        message: format!("message exceeds {max_chars} characters"),
                        details: serde_json::json!({"max_chars": max_chars, "actual": text.chars().count()}),
                    })
                } else {
                    None
                }
            }
            ValidatorConfig::Schema { schema } => {
                // Minimal structural check: a `type: "object"` schema
                // requires the content parse as JSON; anything more
                // elaborate is out of scope here (arena-assert's Schema
                // assertion covers full validation of final output).
                if schema.get("type").and_then(|t| t.as_str()) == Some("object")
                    && serde_json::from_str::<serde_json::Value>(text).is_err()
                {
                    Some(Violation {
                        validator: "schema".into(),
                        message: "content is not valid JSON".into(),
                        details: serde_json::Value::Null,
                    })
                } else {
                    None
                }
            }
        }
    }

    fn validator_name(validator: &ValidatorConfig) -> &'static str {
        match validator {
            ValidatorConfig::BannedWords { .. } => "banned_words",
            ValidatorConfig::MaxLength { .. } => "max_length",
            ValidatorConfig::Schema { .. } => "schema",
        }
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &str {
        "validation"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &SharedContext, input: &mut ElementReceiver, output: &ElementSender) -> Result<()> {
        let cancel = { ctx.lock().await.cancel.clone() };
        let mut guard = ctx.lock().await;

        let validators: Vec<ValidatorConfig> = guard
            .metadata
            .get("validators")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        if validators.is_empty() {
            drop(guard);
            return passthrough(input, output, &cancel).await;
        }

        let text = guard.messages.last().map(|m| m.content.clone()).unwrap_or_default();

        let mut triggered = Vec::new();
        for validator in &validators {
            let name = Self::validator_name(validator);
            match Self::check(validator, &text) {
                Some(violation) => {
                    guard.guardrail_failures.insert(name.to_string(), true);
                    triggered.push(violation);
                }
                None => {
                    guard.guardrail_failures.entry(name.to_string()).or_insert(false);
                }
            }
        }

        if !triggered.is_empty() {
            match self.mode {
                ValidationMode::Test => {
                    guard.violations.extend(triggered);
                }
                ValidationMode::Production => {
                    let messages: Vec<String> = triggered.iter().map(|v| v.message.clone()).collect();
                    drop(guard);
                    return Err(Error::Validation(messages));
                }
            }
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
    use arena_domain::message::Message;
    use tokio::sync::mpsc;

    fn configs() -> serde_json::Value {
        serde_json::json!([
            {"kind": "banned_words", "words": ["damn"]},
            {"kind": "max_length", "max_chars": 100},
        ])
    }

    async fn ctx_with(text: &str, mode: ValidationMode) -> (SharedContext, ValidationStage) {
        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        {
            let mut guard = ctx.lock().await;
            guard.messages.push(Message::assistant(text));
            guard.metadata.insert("validators".into(), configs());
        }
        (ctx, ValidationStage::new(mode))
    }

    #[tokio::test]
    async fn test_mode_records_violation_and_continues() {
        let (ctx, stage) = ctx_with("well damn", ValidationMode::Test).await;
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        in_tx.send(StreamElement::text("seed")).await.unwrap();
        drop(in_tx);
        stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap();
        drop(out_tx);
        assert!(out_rx.recv().await.is_some());
        let guard = ctx.lock().await;
        assert_eq!(guard.violations.len(), 1);
        assert_eq!(guard.guardrail_failures.get("banned_words"), Some(&true));
        assert_eq!(guard.guardrail_failures.get("max_length"), Some(&false));
    }

    #[tokio::test]
    async fn production_mode_hard_errors() {
        let (ctx, stage) = ctx_with("well damn", ValidationMode::Production).await;
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        drop(in_tx);
        let err = stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn clean_text_triggers_nothing() {
        let (ctx, stage) = ctx_with("a clean response", ValidationMode::Test).await;
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        drop(in_tx);
        stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap();
        let guard = ctx.lock().await;
        assert!(guard.violations.is_empty());
        assert_eq!(guard.guardrail_failures.get("banned_words"), Some(&false));
    }
}
