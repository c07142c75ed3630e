//! Run result and aggregation types.

use crate::assertion::AssertionResult;
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub validator: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolStats {
    pub calls_total: u64,
    pub calls_completed: u64,
    pub calls_failed: u64,
    pub calls_pending: u64,
    /// Per-tool invocation counts.
    #[serde(default)]
    pub by_tool: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationAssertionSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
}

/// Outcome of executing one `(scenario, provider, region)` triple.
/// Immutable once persisted — mutated only by stages during execution,
/// then sealed by the scenario engine on completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub scenario_id: String,
    pub provider_id: String,
    pub region: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub cost: f64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    pub duration_ms: u64,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tool_stats: ToolStats,
    #[serde(default)]
    pub conversation_assertions: ConversationAssertionSummary,
    #[serde(default)]
    pub turn_assertions: HashMap<u32, Vec<AssertionResult>>,
    /// Set when the provider stage recorded a pending tool call and the
    /// run stopped to await external approval.
    #[serde(default)]
    pub pending_approval: bool,
}

impl RunResult {
    /// Success classification: passed iff `error` is empty, the run is
    /// not pending approval, every assertion — turn and conversation —
    /// passed, and (`violations` is empty OR the scenario has
    /// assertions). A scenario with no assertions can't out-vote a
    /// recorded violation, so it still fails in that case.
    pub fn passed(&self) -> bool {
        if self.error.is_some() || self.pending_approval {
            return false;
        }

        let has_assertions = self.conversation_assertions.total > 0
            || self.turn_assertions.values().any(|v| !v.is_empty());
        if !self.violations.is_empty() && !has_assertions {
            return false;
        }

        let conversation_all_passed = self.conversation_assertions.failed == 0;
        let turn_all_passed = self
            .turn_assertions
            .values()
            .flatten()
            .all(|r| r.passed);
        conversation_all_passed && turn_all_passed
    }

    /// True when this run passed per `passed()` but still carries
    /// recorded violations — surfaced explicitly because a
    /// violation-carrying green run is surprising to operators (see
    /// DESIGN.md's Open Question notes).
    pub fn passed_with_violations(&self) -> bool {
        self.passed() && !self.violations.is_empty()
    }

    /// Stable hash over ordered message contents + ordered assertion
    /// type/pass booleans + ordered turn-level assertion types/booleans.
    /// Two runs with identical fingerprints are considered duplicates
    /// for regression-corpus deduplication.
    pub fn fingerprint(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();

        for msg in &self.messages {
            hasher.update(format!("{:?}", msg.role).as_bytes());
            hasher.update(b"\0");
            hasher.update(msg.content.as_bytes());
            hasher.update(b"\0");
        }

        let mut turn_indices: Vec<&u32> = self.turn_assertions.keys().collect();
        turn_indices.sort();
        for idx in turn_indices {
            for result in &self.turn_assertions[idx] {
                hasher.update(result.kind.as_bytes());
                hasher.update(&[result.passed as u8]);
            }
        }

        hasher.update(self.conversation_assertions.total.to_le_bytes());
        hasher.update(self.conversation_assertions.passed.to_le_bytes());
        hasher.update(self.conversation_assertions.failed.to_le_bytes());

        hasher.finalize().into()
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }
}
