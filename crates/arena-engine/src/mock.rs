//! Mock-scaffolding recorder. `MockConfig` itself (and its
//! scenario/turn shape, and `.merge()`) lives in `arena_providers::mock`
//! alongside `MockProvider`, which actually serves it; this module owns
//! only the half that turns a completed run back into fixture data.
//!
//! Grounded on `sessions::store::SessionStore::flush`'s read-merge-write
//! idiom: load whatever is already on disk, merge the new recording in,
//! write the whole file back.

use std::path::Path;

use arena_domain::message::{Message, Role};
use arena_domain::result::RunResult;
use arena_domain::Result;
use arena_providers::{MockConfig, MockTurnConfig};

/// Ingests completed runs and derives (or merges into) a [`MockConfig`]
/// so a later run can be replayed deterministically against
/// `MockProvider` instead of a live vendor — promoting an observed run
/// to a fixture.
#[derive(Debug, Default)]
pub struct Recorder {
    pending: MockConfig,
}

impl Recorder {
    pub fn new() -> Self {
        Self { pending: MockConfig::default() }
    }

    /// Derive one turn's fixture per assistant message found in `run`,
    /// keyed by the run's scenario id and 1-based turn position among
    /// assistant messages. Tool calls attached to an assistant message
    /// are carried into the fixture unchanged.
    pub fn record(&mut self, run: &RunResult) {
        let scenario = self.pending.scenarios.entry(run.scenario_id.clone()).or_default();
        for (turn_index, message) in assistant_turns(&run.messages) {
            scenario.turns.insert(
                turn_index,
                MockTurnConfig {
                    response: Some(message.content.clone()),
                    tool_calls: message.tool_calls.clone(),
                },
            );
        }
    }

    /// Record every run in a batch.
    pub fn record_all<'a>(&mut self, runs: impl IntoIterator<Item = &'a RunResult>) {
        for run in runs {
            self.record(run);
        }
    }

    /// Everything recorded so far, without touching disk.
    pub fn into_config(self) -> MockConfig {
        self.pending
    }

    /// Read-merge-write the recorded config into `path`. If the file
    /// doesn't exist yet, it's created; if it does, the recording is
    /// merged scenario-by-scenario and turn-by-turn rather than
    /// overwriting whatever else the file already describes.
    pub async fn flush(self, path: &Path) -> Result<()> {
        let mut existing = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice::<MockConfig>(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MockConfig::default(),
            Err(e) => return Err(e.into()),
        };
        existing.merge(self.pending);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_vec_pretty(&existing)?;
        tokio::fs::write(path, serialized).await?;
        Ok(())
    }
}

/// 1-based position of each assistant message among the assistant
/// messages in `messages`, paired with the message itself. Matches the
/// turn numbering the scenario engine assigns when it seeds each turn.
fn assistant_turns(messages: &[Message]) -> impl Iterator<Item = (u32, &Message)> {
    messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .enumerate()
        .map(|(i, m)| ((i + 1) as u32, m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_domain::message::ToolCall;
    use arena_domain::result::{ConversationAssertionSummary, ToolStats};
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;

    fn sample_run(scenario_id: &str, messages: Vec<Message>) -> RunResult {
        RunResult {
            run_id: "r1".into(),
            scenario_id: scenario_id.into(),
            provider_id: "p1".into(),
            region: "us".into(),
            messages,
            violations: Vec::new(),
            cost: 0.0,
            prompt_tokens: 0,
            completion_tokens: 0,
            duration_ms: 1,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            tool_stats: ToolStats::default(),
            conversation_assertions: ConversationAssertionSummary::default(),
            turn_assertions: StdHashMap::new(),
            pending_approval: false,
        }
    }

    #[test]
    fn records_assistant_messages_keyed_by_position() {
        let run = sample_run(
            "s1",
            vec![Message::user("hi"), Message::assistant("hello there")],
        );
        let mut recorder = Recorder::new();
        recorder.record(&run);
        let config = recorder.into_config();
        let scenario = config.scenarios.get("s1").unwrap();
        assert_eq!(scenario.turns.get(&1).unwrap().response.as_deref(), Some("hello there"));
    }

    #[test]
    fn preserves_tool_calls_on_recorded_turn() {
        let calls = vec![ToolCall { id: "c1".into(), name: "get_weather".into(), args: serde_json::json!({}) }];
        let run = sample_run(
            "s1",
            vec![Message::assistant_with_tool_calls("", calls.clone())],
        );
        let mut recorder = Recorder::new();
        recorder.record(&run);
        let config = recorder.into_config();
        let turn = config.scenarios.get("s1").unwrap().turns.get(&1).unwrap();
        assert_eq!(turn.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flush_merges_into_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock.json");

        let mut first = Recorder::new();
        first.record(&sample_run("s1", vec![Message::assistant("first")]));
        first.flush(&path).await.unwrap();

        let mut second = Recorder::new();
        second.record(&sample_run("s2", vec![Message::assistant("second")]));
        second.flush(&path).await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        let merged: MockConfig = serde_json::from_slice(&bytes).unwrap();
        assert!(merged.scenarios.contains_key("s1"));
        assert!(merged.scenarios.contains_key("s2"));
    }
}
