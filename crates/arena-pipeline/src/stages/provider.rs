//! Provider stage: the multi-round tool-calling loop — LLM call,
//! accumulate tool calls, dispatch, append tool_result, repeat —
//! stopping at a pending-tool boundary instead of streaming SSE events
//! to a live client.

use std::collections::HashSet;
use std::sync::Arc;

use arena_domain::message::{Message, ToolCall};
use arena_domain::provider::ChatRequest;
use arena_domain::tool::{ExecutionStatus, PendingToolCall, ToolDescriptor};
use arena_domain::{Error, Result};
use arena_providers::LlmProvider;
use arena_tools::ToolRegistry;
use async_trait::async_trait;

use crate::context::SharedContext;
use crate::element::StreamElement;
use crate::stage::{send_checked, ElementReceiver, ElementSender, Stage, StageKind};

fn default_round_cap() -> u32 {
    10
}

pub struct ProviderStage {
    provider: Arc<dyn LlmProvider>,
    tool_registry: Arc<ToolRegistry>,
    round_cap: u32,
    blocklist: HashSet<String>,
}

impl ProviderStage {
    pub fn new(provider: Arc<dyn LlmProvider>, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tool_registry,
            round_cap: default_round_cap(),
            blocklist: HashSet::new(),
        }
    }

    pub fn with_round_cap(mut self, round_cap: u32) -> Self {
        self.round_cap = round_cap;
        self
    }

    pub fn with_blocklist(mut self, blocklist: HashSet<String>) -> Self {
        self.blocklist = blocklist;
        self
    }
}

#[async_trait]
impl Stage for ProviderStage {
    fn name(&self) -> &str {
        "provider"
    }

    fn kind(&self) -> StageKind {
        StageKind::Bidirectional
    }

    async fn process(&self, ctx: &SharedContext, _input: &mut ElementReceiver, output: &ElementSender) -> Result<()> {
        let (cancel, region, model, enabled_tools) = {
            let guard = ctx.lock().await;
            let permitted: Vec<String> = guard
                .metadata
                .get("permitted_tools")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            let enabled: Vec<ToolDescriptor> = permitted
                .iter()
                .filter_map(|name| self.tool_registry.get(name))
                .collect();
            let region = guard
                .metadata
                .get("region")
                .and_then(|v| v.as_str())
                .unwrap_or("default")
                .to_string();
            let model = guard
                .metadata
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or("default")
                .to_string();
            (guard.cancel.clone(), region, model, enabled)
        };

        let mut round = 0u32;
        loop {
            round += 1;
            if round > self.round_cap {
                return Err(Error::ToolRoundCap { rounds: self.round_cap });
            }

            let (messages, mut parameters, turn_index) = {
                let guard = ctx.lock().await;
                (guard.messages.clone(), std::collections::HashMap::new(), guard.turn_index)
            };
            // The mock provider keys its deterministic fixtures on
            // these two parameters; real adapters ignore them.
            if let Some(scenario_id) = { ctx.lock().await.metadata.get("scenario_id").cloned() } {
                parameters.insert("__scenario_id".to_string(), scenario_id);
            }
            parameters.insert("__turn_index".to_string(), serde_json::json!(turn_index));

            let request = ChatRequest {
                messages,
                tools: if enabled_tools.is_empty() { None } else { Some(enabled_tools.clone()) },
                tool_choice: None,
                temperature: None,
                max_tokens: None,
                region: region.clone(),
                model: model.clone(),
                parameters,
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled("provider stage cancelled".into())),
                result = self.provider.chat(&request) => result?,
            };

            {
                let mut guard = ctx.lock().await;
                let cost = self.provider.calculate_cost(
                    response.usage.prompt_tokens,
                    response.usage.completion_tokens,
                    response.usage.cached_prompt_tokens,
                );
                guard.cost.add(cost, &response.usage);

                let assistant_message = if response.tool_calls.is_empty() {
                    Message::assistant(response.content.clone())
                } else {
                    Message::assistant_with_tool_calls(response.content.clone(), response.tool_calls.clone())
                };
                guard.messages.push(assistant_message);
            }

            send_checked(
                output,
                StreamElement::message(Message::assistant(response.content.clone())),
                &cancel,
            )
            .await?;

            if response.tool_calls.is_empty() {
                break;
            }

            let mut terminated_on_pending = false;
            for tc in &response.tool_calls {
                if self.blocklist.contains(&tc.name) {
                    let mut guard = ctx.lock().await;
                    guard.messages.push(Message::tool_error(tc.id.clone(), tc.name.clone(), "tool is blocklisted"));
                    drop(guard);
                    send_checked(output, tool_call_element(tc), &cancel).await?;
                    continue;
                }

                send_checked(output, tool_call_element(tc), &cancel).await?;

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled("provider stage cancelled".into())),
                    result = self.tool_registry.execute_async(&tc.name, tc.args.clone()) => result,
                };

                match result {
                    Ok(exec) => match exec.status {
                        ExecutionStatus::Complete => {
                            let mut guard = ctx.lock().await;
                            guard.messages.push(Message::tool_result(tc.id.clone(), tc.name.clone(), exec.content.unwrap_or_default()));
                        }
                        ExecutionStatus::Failed => {
                            let mut guard = ctx.lock().await;
                            guard.messages.push(Message::tool_error(tc.id.clone(), tc.name.clone(), exec.error.unwrap_or_default()));
                        }
                        ExecutionStatus::Pending => match exec.pending_info {
                            Some(info) => {
                                let mut guard = ctx.lock().await;
                                guard.messages.push(Message::tool_result(tc.id.clone(), tc.name.clone(), info.user_message.clone()));
                                guard.pending_tool_calls.push(PendingToolCall {
                                    call_id: tc.id.clone(),
                                    tool_name: tc.name.clone(),
                                    args: tc.args.clone(),
                                    pending_info: info,
                                });
                                terminated_on_pending = true;
                                break;
                            }
                            None => {
                                let mut guard = ctx.lock().await;
                                guard.messages.push(Message::tool_error(
                                    tc.id.clone(),
                                    tc.name.clone(),
                                    "tool reported pending status without pending_info",
                                ));
                            }
                        },
                    },
                    Err(e) => {
                        let mut guard = ctx.lock().await;
                        guard.messages.push(Message::tool_error(tc.id.clone(), tc.name.clone(), e.to_string()));
                    }
                }
            }

            if terminated_on_pending {
                break;
            }
        }

        Ok(())
    }
}

fn tool_call_element(tc: &ToolCall) -> StreamElement {
    StreamElement::tool_call(tc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use arena_domain::tool::ToolMode;
    use arena_providers::{MockConfig, MockProvider, MockScenarioConfig, MockTurnConfig};
    use arena_tools::MockExecutor;
    use tokio::sync::mpsc;

    fn tool_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "get_weather".into(),
            description: "weather lookup".into(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            mode: ToolMode::Mock,
            timeout_ms: 1000,
            mock_result: Some(serde_json::json!({"temp": 72})),
            http_config: None,
            server_binding: None,
        }
    }

    async fn run_stage(stage: &ProviderStage, ctx: &SharedContext) -> Vec<StreamElement> {
        let (_in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        stage.process(ctx, &mut in_rx, &out_tx).await.unwrap();
        drop(out_tx);
        let mut elements = Vec::new();
        while let Some(e) = out_rx.recv().await {
            elements.push(e);
        }
        elements
    }

    #[tokio::test]
    async fn single_turn_pass_through_no_tools() {
        let mut mock = MockConfig::default();
        mock.default_response = Some("hi there".into());
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock-1", mock));
        let registry = Arc::new(ToolRegistry::new());
        let stage = ProviderStage::new(provider, registry);

        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        ctx.lock().await.messages.push(Message::user("hello"));

        let elements = run_stage(&stage, &ctx).await;
        assert_eq!(elements.len(), 1);
        let guard = ctx.lock().await;
        assert_eq!(guard.messages.last().unwrap().content, "hi there");
    }

    #[tokio::test]
    async fn tool_round_cap_exceeded_errors() {
        let mut mock = MockConfig::default();
        let mut scenario = MockScenarioConfig::default();
        scenario.turns.insert(
            1,
            MockTurnConfig {
                response: Some(String::new()),
                tool_calls: Some(vec![ToolCall { id: "c1".into(), name: "get_weather".into(), args: serde_json::json!({}) }]),
            },
        );
        mock.scenarios.insert("s1".into(), scenario);
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock-1", mock));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(tool_descriptor());
        registry.register_executor(ToolMode::Mock, Arc::new(MockExecutor));
        let stage = ProviderStage::new(provider, registry).with_round_cap(2);

        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        {
            let mut guard = ctx.lock().await;
            guard.messages.push(Message::user("what's the weather"));
            guard.metadata.insert("scenario_id".into(), serde_json::json!("s1"));
        }
        let (_in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let err = stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap_err();
        assert!(matches!(err, Error::ToolRoundCap { rounds: 2 }));
    }

    #[tokio::test]
    async fn blocklisted_tool_records_error_without_executing() {
        let mut mock = MockConfig::default();
        let mut scenario = MockScenarioConfig::default();
        scenario.turns.insert(
            1,
            MockTurnConfig {
                response: Some(String::new()),
                tool_calls: Some(vec![ToolCall { id: "c1".into(), name: "delete_account".into(), args: serde_json::json!({}) }]),
            },
        );
        mock.scenarios.insert("s1".into(), scenario);
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock-1", mock));
        let registry = Arc::new(ToolRegistry::new());
        let mut descriptor = tool_descriptor();
        descriptor.name = "delete_account".into();
        registry.register(descriptor);
        registry.register_executor(ToolMode::Mock, Arc::new(MockExecutor));

        let mut blocklist = HashSet::new();
        blocklist.insert("delete_account".to_string());
        let stage = ProviderStage::new(provider, registry).with_round_cap(1).with_blocklist(blocklist);

        let ctx = crate::context::shared(ExecutionContext::new("r1", "c1", 1));
        {
            let mut guard = ctx.lock().await;
            guard.messages.push(Message::user("delete my account"));
            guard.metadata.insert("scenario_id".into(), serde_json::json!("s1"));
        }
        let (_in_tx, mut in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let err = stage.process(&ctx, &mut in_rx, &out_tx).await.unwrap_err();
        assert!(matches!(err, Error::ToolRoundCap { .. }));

        let guard = ctx.lock().await;
        let tool_msg = guard.messages.iter().find(|m| m.tool_result.is_some()).unwrap();
        assert!(tool_msg.tool_result.as_ref().unwrap().error.as_ref().unwrap().contains("blocklisted"));
    }
}
