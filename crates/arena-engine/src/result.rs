//! Result aggregation: `ResultSummary` rolls up a batch of
//! `RunResult`s using the scenario engine's pass/fail classification,
//! and exposes fingerprint-based deduplication for regression corpora.

use std::collections::HashSet;

use arena_domain::result::RunResult;

/// Immutable once built, mirroring `RunResult`: both are immutable
/// value types.
#[derive(Debug, Clone, Default)]
pub struct ResultSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub passed_with_violations: usize,
    pub pending_approval: usize,
    pub total_cost: f64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_duration_ms: u64,
    pub scenarios: Vec<String>,
    pub providers: Vec<String>,
    pub regions: Vec<String>,
}

impl ResultSummary {
    /// Build a summary from a batch of runs. Unique `(scenarios,
    /// providers, regions)` are extracted and sorted for stable output.
    pub fn from_runs(runs: &[RunResult]) -> Self {
        let mut summary = ResultSummary {
            total: runs.len(),
            ..Default::default()
        };

        let mut scenario_set = HashSet::new();
        let mut provider_set = HashSet::new();
        let mut region_set = HashSet::new();

        for run in runs {
            if run.passed() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            if run.passed_with_violations() {
                summary.passed_with_violations += 1;
            }
            if run.pending_approval {
                summary.pending_approval += 1;
            }
            summary.total_cost += run.cost;
            summary.total_duration_ms += run.duration_ms;

            scenario_set.insert(run.scenario_id.clone());
            provider_set.insert(run.provider_id.clone());
            region_set.insert(run.region.clone());
        }

        summary.scenarios = sorted(scenario_set);
        summary.providers = sorted(provider_set);
        summary.regions = sorted(region_set);
        summary
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

fn sorted(set: HashSet<String>) -> Vec<String> {
    let mut v: Vec<String> = set.into_iter().collect();
    v.sort();
    v
}

/// Collapse a batch of runs to one representative per fingerprint —
/// runs with identical fingerprints collapse to one representative.
/// Preserves first-seen order.
pub fn dedupe_by_fingerprint(runs: Vec<RunResult>) -> Vec<RunResult> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(runs.len());
    for run in runs {
        if seen.insert(run.fingerprint_hex()) {
            out.push(run);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_domain::result::{ConversationAssertionSummary, ToolStats};
    use chrono::Utc;

    fn run(scenario_id: &str, provider_id: &str, passed: bool) -> RunResult {
        RunResult {
            run_id: format!("{scenario_id}-{provider_id}"),
            scenario_id: scenario_id.into(),
            provider_id: provider_id.into(),
            region: "us".into(),
            messages: vec![],
            violations: if passed { vec![] } else {
                vec![arena_domain::result::Violation {
                    validator: "x".into(),
                    message: "x".into(),
                    details: serde_json::Value::Null,
                }]
            },
            cost: 0.1,
            prompt_tokens: 0,
            completion_tokens: 0,
            duration_ms: 5,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            tool_stats: ToolStats::default(),
            conversation_assertions: ConversationAssertionSummary::default(),
            turn_assertions: Default::default(),
            pending_approval: false,
        }
    }

    #[test]
    fn summary_counts_pass_and_fail() {
        let runs = vec![run("s1", "p1", true), run("s1", "p2", false)];
        let summary = ResultSummary::from_runs(&runs);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn summary_extracts_unique_triples() {
        let runs = vec![run("s1", "p1", true), run("s1", "p1", true), run("s2", "p1", true)];
        let summary = ResultSummary::from_runs(&runs);
        assert_eq!(summary.scenarios, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(summary.providers, vec!["p1".to_string()]);
    }

    #[test]
    fn dedupe_collapses_identical_fingerprints() {
        let runs = vec![run("s1", "p1", true), run("s1", "p1", true)];
        let deduped = dedupe_by_fingerprint(runs);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn all_passing_exits_zero() {
        let runs = vec![run("s1", "p1", true)];
        assert_eq!(ResultSummary::from_runs(&runs).exit_code(), 0);
    }
}
