//! Scenario engine: the cross-product planner that drives every
//! `(scenario, provider)` pair through the pipeline turn by turn
//! and seals a `RunResult` per pair.
//!
//! Grounded on `crates/gateway/src/bootstrap.rs`'s shared-state wiring
//! (build registries and stores once, hand `Arc` clones to each worker)
//! and `crates/gateway/src/runtime/runs.rs`'s run lifecycle (started,
//! sealed, never resurrected).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arena_assert::{AssertionContext, AssertionEvaluator, WorkflowState};
use arena_domain::assertion::AssertionResult;
use arena_domain::config::{ArenaConfig, PromptConfig};
use arena_domain::message::{Message, Role, ToolCall};
use arena_domain::event::{Event, EventType};
use arena_domain::result::{ConversationAssertionSummary, RunResult, ToolStats, Violation};
use arena_domain::scenario::{ProviderConfig, Scenario, TaskRef, Turn};
use arena_pipeline::{
    shared, CancelToken, ExecutionContext, Pipeline, PipelineBuilder, PipelineConfig, PromptAssemblyStage,
    ProviderStage, StateLoadStage, StateSaveStage, StreamElement, TemplateStage, ValidationMode, ValidationStage,
};
use arena_providers::ProviderRegistry;
use arena_state::StateStore;
use arena_tools::ToolRegistry;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::events::{EventBus, EventBusSink};

fn default_round_cap() -> u32 {
    10
}

/// Wires everything a turn needs to run once: registries, stores, the
/// event bus, and the knobs that come from `ArenaConfig`. The engine
/// owns no state of its own beyond what it needs to plan and supervise
/// runs.
pub struct ScenarioEngine {
    scenarios: Vec<Scenario>,
    providers: Vec<ProviderConfig>,
    prompt_configs: Vec<PromptConfig>,
    provider_registry: Arc<ProviderRegistry>,
    tool_registry: Arc<ToolRegistry>,
    store: Arc<dyn StateStore>,
    evaluator: Arc<AssertionEvaluator>,
    event_bus: Arc<EventBus>,
    max_concurrent: usize,
    round_cap: u32,
    blocklist: HashSet<String>,
    per_run_timeout: Duration,
    root_cancel: CancelToken,
}

impl ScenarioEngine {
    pub fn new(
        config: &ArenaConfig,
        provider_registry: Arc<ProviderRegistry>,
        tool_registry: Arc<ToolRegistry>,
        store: Arc<dyn StateStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            scenarios: config.scenarios.clone(),
            providers: config.providers.clone(),
            prompt_configs: config.prompt_configs.clone(),
            provider_registry,
            tool_registry,
            store,
            evaluator: Arc::new(AssertionEvaluator::new()),
            event_bus,
            max_concurrent: config.max_concurrent.max(1),
            round_cap: default_round_cap(),
            blocklist: HashSet::new(),
            per_run_timeout: Duration::from_millis(config.defaults.per_run_timeout_ms),
            root_cancel: CancelToken::new(),
        }
    }

    /// A clone of the engine-wide cancellation token. Cancelling it (e.g.
    /// from a `SIGINT` handler) stops every in-flight turn and prevents
    /// any not-yet-started turn from beginning.
    pub fn cancel_token(&self) -> CancelToken {
        self.root_cancel.clone()
    }

    pub fn with_round_cap(mut self, round_cap: u32) -> Self {
        self.round_cap = round_cap;
        self
    }

    pub fn with_blocklist(mut self, blocklist: HashSet<String>) -> Self {
        self.blocklist = blocklist;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<AssertionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Run every `(scenario, provider)` pair, bounded by `max_concurrent`
    /// in-flight runs at once via a semaphore-gated worker pool rather
    /// than one task per triple.
    pub async fn run(self: Arc<Self>) -> Vec<RunResult> {
        let pairs: Vec<(Scenario, ProviderConfig)> = self
            .scenarios
            .iter()
            .flat_map(|s| self.providers.iter().map(move |p| (s.clone(), p.clone())))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set: JoinSet<RunResult> = JoinSet::new();

        for (scenario, provider_cfg) in pairs {
            let engine = self.clone();
            let permit_guard = semaphore.clone();
            join_set.spawn(async move {
                let _permit = permit_guard.acquire_owned().await.expect("semaphore is never closed");
                engine.run_pair(&scenario, &provider_cfg).await
            });
        }

        let mut results = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "scenario engine worker task panicked"),
            }
        }
        results
    }

    fn build_pipeline(&self, provider: Arc<dyn arena_providers::LlmProvider>) -> Pipeline {
        PipelineBuilder::new()
            .with_config(PipelineConfig {
                execution_timeout: Some(self.per_run_timeout),
                ..Default::default()
            })
            .add_stage(Arc::new(StateLoadStage::new(self.store.clone())))
            .add_stage(Arc::new(PromptAssemblyStage::new(self.prompt_configs.clone())))
            .add_stage(Arc::new(TemplateStage::new(Vec::new())))
            .add_stage(Arc::new(ValidationStage::new(ValidationMode::Test)))
            .add_stage(Arc::new(
                ProviderStage::new(provider, self.tool_registry.clone())
                    .with_round_cap(self.round_cap)
                    .with_blocklist(self.blocklist.clone()),
            ))
            .add_stage(Arc::new(StateSaveStage::new(self.store.clone())))
            .build()
    }

    async fn run_pair(&self, scenario: &Scenario, provider_cfg: &ProviderConfig) -> RunResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let conversation_id = run_id.clone();
        let start_time = chrono::Utc::now();
        let started_at = Instant::now();

        self.event_bus.publish(Event::new(EventType::RunStarted, &run_id, &conversation_id));

        let provider = match self.provider_registry.get(&provider_cfg.id) {
            Some(p) => p,
            None => {
                let message = format!("provider '{}' is not available (check init errors)", provider_cfg.id);
                self.event_bus.publish(
                    Event::new(EventType::RunFailed, &run_id, &conversation_id)
                        .with_data(serde_json::json!({ "error": message })),
                );
                return sealed_error_result(run_id, scenario, provider_cfg, start_time, started_at, message);
            }
        };

        let pipeline = self.build_pipeline(provider);
        let mut loop_state = TurnLoopState::new();

        let outcome = tokio::time::timeout(
            self.per_run_timeout,
            self.run_turns(scenario, provider_cfg, &run_id, &conversation_id, &pipeline, &mut loop_state),
        )
        .await;

        if outcome.is_err() {
            loop_state.error = Some("run exceeded per_run_timeout_ms".to_string());
        }

        let conv_results = self.evaluate_conversation_assertions(scenario, &loop_state);
        let conversation_assertions = ConversationAssertionSummary {
            total: conv_results.len() as u64,
            passed: conv_results.iter().filter(|r| r.passed).count() as u64,
            failed: conv_results.iter().filter(|r| !r.passed).count() as u64,
        };

        let end_time = chrono::Utc::now();
        let duration_ms = started_at.elapsed().as_millis() as u64;

        let result = RunResult {
            run_id: run_id.clone(),
            scenario_id: scenario.id.clone(),
            provider_id: provider_cfg.id.clone(),
            region: provider_cfg.region.clone(),
            messages: loop_state.messages,
            violations: loop_state.violations,
            cost: loop_state.total_cost,
            prompt_tokens: loop_state.prompt_tokens,
            completion_tokens: loop_state.completion_tokens,
            duration_ms,
            start_time,
            end_time: Some(end_time),
            error: loop_state.error,
            tool_stats: loop_state.tool_stats,
            conversation_assertions,
            turn_assertions: loop_state.turn_assertions,
            pending_approval: loop_state.pending_approval,
        };

        if let Err(e) = self.store.save_result(&result).await {
            tracing::warn!(run_id = %run_id, error = %e, "failed to persist run result");
        }

        let event_type = if result.error.is_some() { EventType::RunFailed } else { EventType::RunCompleted };
        self.event_bus.publish(
            Event::new(event_type, &run_id, &conversation_id).with_data(serde_json::json!({ "passed": result.passed() })),
        );

        result
    }

    async fn run_turns(
        &self,
        scenario: &Scenario,
        provider_cfg: &ProviderConfig,
        run_id: &str,
        conversation_id: &str,
        pipeline: &Pipeline,
        state: &mut TurnLoopState,
    ) {
        let total_turns = scenario.turns.len();

        for (i, turn) in scenario.turns.iter().enumerate() {
            if self.root_cancel.is_cancelled() {
                state.error = Some("run cancelled".to_string());
                return;
            }

            let turn_index = (i + 1) as u32;
            self.event_bus.publish(
                Event::new(EventType::TurnStarted, run_id, conversation_id)
                    .with_data(serde_json::json!({ "turn_index": turn_index })),
            );

            let mut ctx = ExecutionContext::new(run_id.to_string(), conversation_id.to_string(), turn_index)
                .with_event_sink(Arc::new(EventBusSink::new(self.event_bus.clone())));
            ctx.cancel = self.root_cancel.clone();

            seed_turn_message(&mut ctx, turn);
            apply_turn_metadata(&mut ctx, scenario, provider_cfg);

            let shared_ctx = shared(ctx);
            let outcome = pipeline.execute_sync(shared_ctx.clone(), StreamElement::text(format!("turn-{turn_index}"))).await;

            let guard = shared_ctx.lock().await;
            let turn_start = state.messages.len();
            let turn_messages: Vec<Message> = guard.messages.clone();
            state.messages = turn_messages.clone();
            state.violations.extend(guard.violations.iter().cloned());
            for (k, v) in guard.guardrail_failures.iter() {
                state.guardrail_failures.insert(k.clone(), *v);
            }
            let turn_pending = guard.pending_tool_calls.clone();
            state.total_cost += guard.cost.total_cost;
            state.prompt_tokens += guard.cost.prompt_tokens;
            state.completion_tokens += guard.cost.completion_tokens;
            drop(guard);

            let new_messages = &turn_messages[turn_start.min(turn_messages.len())..];
            accumulate_tool_stats(&mut state.tool_stats, new_messages, &turn_pending);

            state.workflow_history.push(workflow_label(turn, turn_index));
            let is_last = i + 1 == total_turns;
            let workflow_state = WorkflowState {
                current: state.workflow_history.last().cloned(),
                history: state.workflow_history.clone(),
                terminal: is_last && turn_pending.is_empty(),
            };

            let (assistant_text, tool_calls) = last_assistant_turn(new_messages);
            let assertion_ctx =
                AssertionContext::new(&assistant_text, &tool_calls, &state.guardrail_failures).with_workflow(&workflow_state);
            let turn_results: Vec<AssertionResult> =
                turn.assertions().iter().map(|a| self.evaluator.evaluate(a, &assertion_ctx)).collect();
            if !turn_results.is_empty() {
                state.turn_assertions.insert(turn_index, turn_results);
            }

            if let Some(e) = outcome.error {
                state.error = Some(e.to_string());
                self.event_bus.publish(
                    Event::new(EventType::RunFailed, run_id, conversation_id)
                        .with_data(serde_json::json!({ "turn_index": turn_index, "error": state.error })),
                );
                return;
            }

            self.event_bus.publish(
                Event::new(EventType::TurnCompleted, run_id, conversation_id)
                    .with_data(serde_json::json!({ "turn_index": turn_index })),
            );

            if !turn_pending.is_empty() {
                state.pending_approval = true;
                return;
            }
        }
    }

    fn evaluate_conversation_assertions(&self, scenario: &Scenario, state: &TurnLoopState) -> Vec<AssertionResult> {
        if scenario.assertions.is_empty() {
            return Vec::new();
        }
        let (assistant_text, tool_calls) = last_assistant_turn(&state.messages);
        let workflow_state = WorkflowState {
            current: state.workflow_history.last().cloned(),
            history: state.workflow_history.clone(),
            terminal: !state.pending_approval && state.error.is_none(),
        };
        let ctx = AssertionContext::new(&assistant_text, &tool_calls, &state.guardrail_failures).with_workflow(&workflow_state);
        scenario.assertions.iter().map(|a| self.evaluator.evaluate(a, &ctx)).collect()
    }
}

struct TurnLoopState {
    messages: Vec<Message>,
    violations: Vec<Violation>,
    turn_assertions: HashMap<u32, Vec<AssertionResult>>,
    guardrail_failures: HashMap<String, bool>,
    tool_stats: ToolStats,
    total_cost: f64,
    prompt_tokens: u64,
    completion_tokens: u64,
    pending_approval: bool,
    error: Option<String>,
    workflow_history: Vec<String>,
}

impl TurnLoopState {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            violations: Vec::new(),
            turn_assertions: HashMap::new(),
            guardrail_failures: HashMap::new(),
            tool_stats: ToolStats::default(),
            total_cost: 0.0,
            prompt_tokens: 0,
            completion_tokens: 0,
            pending_approval: false,
            error: None,
            workflow_history: Vec::new(),
        }
    }
}

fn seed_turn_message(ctx: &mut ExecutionContext, turn: &Turn) {
    match turn {
        Turn::UserInput { text, media, .. } => {
            if media.is_empty() {
                ctx.messages.push(Message::user(text.clone()));
            } else {
                let mut parts = vec![arena_domain::message::ContentPart::Text { text: text.clone() }];
                parts.extend(media.iter().cloned());
                ctx.messages.push(Message {
                    role: Role::User,
                    content: text.clone(),
                    parts: Some(parts),
                    tool_calls: None,
                    tool_result: None,
                    metadata: HashMap::new(),
                });
            }
        }
        Turn::WorkflowStep { event, input, .. } => {
            ctx.messages.push(Message::user(format!("[{event}] {input}")));
            ctx.metadata.insert("workflow_event".to_string(), serde_json::json!(event));
        }
    }
}

fn apply_turn_metadata(ctx: &mut ExecutionContext, scenario: &Scenario, provider_cfg: &ProviderConfig) {
    if let TaskRef::TaskType(task_type) = &scenario.task {
        ctx.metadata.insert("task_type".to_string(), serde_json::json!(task_type));
    }
    ctx.metadata.insert("scenario_id".to_string(), serde_json::json!(scenario.id));
    ctx.metadata.insert("region".to_string(), serde_json::json!(provider_cfg.region));
    ctx.metadata.insert("model".to_string(), serde_json::json!(provider_cfg.model));
}

fn workflow_label(turn: &Turn, turn_index: u32) -> String {
    match turn {
        Turn::WorkflowStep { event, .. } => event.clone(),
        Turn::UserInput { .. } => format!("turn_{turn_index}"),
    }
}

fn last_assistant_turn(messages: &[Message]) -> (String, Vec<ToolCall>) {
    let text = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let tool_calls: Vec<ToolCall> = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .filter_map(|m| m.tool_calls.clone())
        .flatten()
        .collect();
    (text, tool_calls)
}

fn accumulate_tool_stats(stats: &mut ToolStats, messages: &[Message], pending: &[arena_domain::tool::PendingToolCall]) {
    for m in messages {
        if m.role != Role::Tool {
            continue;
        }
        let Some(tr) = &m.tool_result else { continue };
        stats.calls_total += 1;
        *stats.by_tool.entry(tr.name.clone()).or_insert(0) += 1;
        if pending.iter().any(|p| p.call_id == tr.id) {
            stats.calls_pending += 1;
        } else if tr.error.is_some() {
            stats.calls_failed += 1;
        } else {
            stats.calls_completed += 1;
        }
    }
}

fn sealed_error_result(
    run_id: String,
    scenario: &Scenario,
    provider_cfg: &ProviderConfig,
    start_time: chrono::DateTime<chrono::Utc>,
    started_at: Instant,
    message: String,
) -> RunResult {
    RunResult {
        run_id,
        scenario_id: scenario.id.clone(),
        provider_id: provider_cfg.id.clone(),
        region: provider_cfg.region.clone(),
        messages: Vec::new(),
        violations: Vec::new(),
        cost: 0.0,
        prompt_tokens: 0,
        completion_tokens: 0,
        duration_ms: started_at.elapsed().as_millis() as u64,
        start_time,
        end_time: Some(chrono::Utc::now()),
        error: Some(message),
        tool_stats: ToolStats::default(),
        conversation_assertions: ConversationAssertionSummary::default(),
        turn_assertions: HashMap::new(),
        pending_approval: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_domain::assertion::{Assertion, AssertionScope};
    use arena_domain::config::DefaultsConfig;
    use arena_domain::scenario::ModelPricing;
    use arena_providers::{MockConfig, MockProvider};
    use arena_state::InMemoryStore;

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            id: "mock-1".into(),
            vendor_tag: "mock".into(),
            model: "mock-model".into(),
            region: "us-east".into(),
            parameters: HashMap::new(),
            auth_env_key: "MOCK_API_KEY".to_string(),
            pricing: ModelPricing::default(),
        }
    }

    fn scenario() -> Scenario {
        Scenario {
            id: "s1".into(),
            description: String::new(),
            task: TaskRef::TaskType("chat".into()),
            turns: vec![Turn::UserInput {
                text: "hello".into(),
                media: Vec::new(),
                assertions: vec![Assertion {
                    kind: "content_includes".into(),
                    params: serde_json::json!({ "values": ["hi there"] }),
                    scope: AssertionScope::Turn,
                    message: None,
                }],
            }],
            assertions: Vec::new(),
        }
    }

    fn arena_config() -> ArenaConfig {
        ArenaConfig {
            providers: vec![provider_config()],
            scenarios: vec![scenario()],
            prompt_configs: Vec::new(),
            tool_servers: Vec::new(),
            defaults: DefaultsConfig { per_run_timeout_ms: 5_000, ..Default::default() },
            state_store: Default::default(),
            max_concurrent: 2,
        }
    }

    #[tokio::test]
    async fn runs_a_scenario_against_a_mock_provider_and_passes() {
        let config = arena_config();
        let mut mock = MockConfig::default();
        mock.default_response = Some("hi there".into());
        let mut provider_registry = ProviderRegistry::empty();
        provider_registry.insert("mock-1", Arc::new(MockProvider::new("mock-1", mock)));
        let provider_registry = Arc::new(provider_registry);

        let engine = Arc::new(ScenarioEngine::new(
            &config,
            provider_registry,
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
        ));

        let results = engine.run().await;
        assert_eq!(results.len(), 1);
        let run = &results[0];
        assert_eq!(run.scenario_id, "s1");
        assert_eq!(run.provider_id, "mock-1");
        assert_eq!(run.region, "us-east");
        assert!(run.error.is_none());
        assert!(run.passed());
    }

    #[tokio::test]
    async fn missing_provider_seals_an_error_result() {
        let mut config = arena_config();
        config.providers[0].id = "unregistered".into();

        let engine = Arc::new(ScenarioEngine::new(
            &config,
            Arc::new(ProviderRegistry::empty()),
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
        ));

        let results = engine.run().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_some());
        assert!(!results[0].passed());
    }
}
