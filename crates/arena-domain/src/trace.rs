//! Structured lifecycle logging, emitted alongside (not instead of) the
//! event bus — these are for log aggregation/grep, the event bus is for
//! in-process pub/sub. A tagged-enum + `tracing::info!` convention.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent<'a> {
    #[serde(rename = "run_started")]
    RunStarted {
        run_id: &'a str,
        scenario_id: &'a str,
        provider_id: &'a str,
        region: &'a str,
    },
    #[serde(rename = "run_sealed")]
    RunSealed {
        run_id: &'a str,
        passed: bool,
        cost: f64,
        duration_ms: u64,
    },
    #[serde(rename = "tool_dispatch")]
    ToolDispatch {
        run_id: &'a str,
        tool_name: &'a str,
        call_id: &'a str,
    },
    #[serde(rename = "tool_round_cap")]
    ToolRoundCap { run_id: &'a str, rounds: u32 },
    #[serde(rename = "provider_call")]
    ProviderCall {
        run_id: &'a str,
        provider_id: &'a str,
        model: &'a str,
        attempt: u32,
    },
    #[serde(rename = "tool_server_state")]
    ToolServerState { server_id: &'a str, state: &'a str },
}

impl<'a> TraceEvent<'a> {
    /// Emit as a structured `tracing::info!` call, using a
    /// `trace_event = %json` field convention.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(trace_event = %json, "trace"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize trace event"),
        }
    }
}
