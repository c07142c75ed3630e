//! Dispatches an `Assertion` by its tagged `type` string to a built-in
//! evaluator or a registered custom one, via tagged variants and a
//! registry keyed by the tag.

use std::collections::HashMap;
use std::sync::Arc;

use arena_domain::assertion::{Assertion, AssertionResult};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use crate::context::AssertionContext;

type CustomFn = dyn Fn(&Assertion, &AssertionContext<'_>) -> AssertionResult + Send + Sync;

/// Evaluates assertions against a turn or conversation context. Every
/// path returns a result; nothing panics or propagates an `Err` —
/// malformed `params` become `passed=false` with `details.error`.
pub struct AssertionEvaluator {
    custom: RwLock<HashMap<String, Arc<CustomFn>>>,
}

impl AssertionEvaluator {
    pub fn new() -> Self {
        Self {
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// Register a custom assertion type. Shadows a built-in of the
    /// same name if one exists; the dispatch set is closed but
    /// extensible via this hook.
    pub fn register<F>(&self, kind: impl Into<String>, evaluator: F)
    where
        F: Fn(&Assertion, &AssertionContext<'_>) -> AssertionResult + Send + Sync + 'static,
    {
        self.custom.write().insert(kind.into(), Arc::new(evaluator));
    }

    pub fn evaluate(&self, assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
        if let Some(custom) = self.custom.read().get(assertion.kind.as_str()) {
            return custom(assertion, ctx);
        }

        match assertion.kind.as_str() {
            "content_includes" => content_includes(assertion, ctx),
            "content_matches" => content_matches(assertion, ctx),
            "content_not_contains" => content_not_contains(assertion, ctx),
            "tools_called" => tools_called(assertion, ctx),
            "tools_not_called" => tools_not_called(assertion, ctx),
            "tools_called_with" => tools_called_with(assertion, ctx),
            "guardrail_triggered" => guardrail_triggered(assertion, ctx),
            "state_is" => state_is(assertion, ctx),
            "transitioned_to" => transitioned_to(assertion, ctx),
            "workflow_complete" => workflow_complete(assertion, ctx),
            other => AssertionResult::error(other, format!("unknown assertion type: {other}")),
        }
    }
}

impl Default for AssertionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn string_list(params: &Value, field: &str) -> Result<Vec<String>, String> {
    let arr = params
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("params.{field} must be an array of strings"))?;
    arr.iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| format!("params.{field} entries must be strings")))
        .collect()
}

fn content_includes(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let values = match string_list(&assertion.params, "values") {
        Ok(v) => v,
        Err(e) => return AssertionResult::error("content_includes", e),
    };
    let case_sensitive = assertion.params.get("case_sensitive").and_then(Value::as_bool).unwrap_or(false);
    let haystack = if case_sensitive { ctx.response_text.to_string() } else { ctx.response_text.to_lowercase() };
    let missing: Vec<&String> = values
        .iter()
        .filter(|v| {
            let needle = if case_sensitive { (*v).clone() } else { v.to_lowercase() };
            !haystack.contains(&needle)
        })
        .collect();
    if missing.is_empty() {
        AssertionResult::pass("content_includes", serde_json::json!({"values": values}))
    } else {
        AssertionResult::fail("content_includes", serde_json::json!({"missing": missing}))
    }
}

fn content_matches(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let pattern = match assertion.params.get("pattern").and_then(Value::as_str) {
        Some(p) => p,
        None => return AssertionResult::error("content_matches", "params.pattern must be a string"),
    };
    match Regex::new(pattern) {
        Ok(re) => {
            if re.is_match(ctx.response_text) {
                AssertionResult::pass("content_matches", serde_json::json!({"pattern": pattern}))
            } else {
                AssertionResult::fail("content_matches", serde_json::json!({"pattern": pattern}))
            }
        }
        Err(e) => AssertionResult::error("content_matches", format!("invalid regex: {e}")),
    }
}

fn content_not_contains(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let values = match string_list(&assertion.params, "values") {
        Ok(v) => v,
        Err(e) => return AssertionResult::error("content_not_contains", e),
    };
    let haystack = ctx.response_text.to_lowercase();
    let present: Vec<&String> = values.iter().filter(|v| haystack.contains(&v.to_lowercase())).collect();
    if present.is_empty() {
        AssertionResult::pass("content_not_contains", serde_json::json!({"values": values}))
    } else {
        AssertionResult::fail("content_not_contains", serde_json::json!({"present": present}))
    }
}

fn tools_called(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let expected = match string_list(&assertion.params, "tools") {
        Ok(v) => v,
        Err(e) => return AssertionResult::error("tools_called", e),
    };
    let called: Vec<&str> = ctx.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
    let missing: Vec<&String> = expected.iter().filter(|t| !called.contains(&t.as_str())).collect();
    if missing.is_empty() {
        AssertionResult::pass("tools_called", serde_json::json!({"tools": expected}))
    } else {
        AssertionResult::fail("tools_called", serde_json::json!({"missing": missing, "called": called}))
    }
}

fn tools_not_called(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let forbidden = match string_list(&assertion.params, "tools") {
        Ok(v) => v,
        Err(e) => return AssertionResult::error("tools_not_called", e),
    };
    let called: Vec<&str> = ctx.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
    let violating: Vec<&String> = forbidden.iter().filter(|t| called.contains(&t.as_str())).collect();
    if violating.is_empty() {
        AssertionResult::pass("tools_not_called", serde_json::json!({"tools": forbidden}))
    } else {
        AssertionResult::fail("tools_not_called", serde_json::json!({"called": violating}))
    }
}

fn tools_called_with(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let tool = match assertion.params.get("tool").and_then(Value::as_str) {
        Some(t) => t,
        None => return AssertionResult::error("tools_called_with", "params.tool must be a string"),
    };
    let expected_args = assertion.params.get("args").cloned().unwrap_or(Value::Null);
    let exact = assertion.params.get("exact").and_then(Value::as_bool).unwrap_or(false);

    let matched = ctx
        .tool_calls
        .iter()
        .filter(|tc| tc.name == tool)
        .any(|tc| if exact { tc.args == expected_args } else { is_subset(&expected_args, &tc.args) });

    if matched {
        AssertionResult::pass("tools_called_with", serde_json::json!({"tool": tool, "args": expected_args}))
    } else {
        let actual: Vec<&Value> = ctx.tool_calls.iter().filter(|tc| tc.name == tool).map(|tc| &tc.args).collect();
        AssertionResult::fail(
            "tools_called_with",
            serde_json::json!({"tool": tool, "expected": expected_args, "actual": actual}),
        )
    }
}

/// `expected` is a subset of `actual` when every key/value in `expected`
/// (an object) is present with an equal value in `actual`.
fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            exp.iter().all(|(k, v)| act.get(k).map(|av| is_subset(v, av)).unwrap_or(false))
        }
        _ => expected == actual,
    }
}

fn guardrail_triggered(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let validator = match assertion.params.get("validator").and_then(Value::as_str) {
        Some(v) => v,
        None => return AssertionResult::error("guardrail_triggered", "params.validator must be a string"),
    };
    let should_trigger = assertion.params.get("should_trigger").and_then(Value::as_bool).unwrap_or(true);
    let actually_triggered = ctx.guardrail_failures.get(validator).copied().unwrap_or(false);

    if actually_triggered == should_trigger {
        AssertionResult::pass(
            "guardrail_triggered",
            serde_json::json!({"validator": validator, "triggered": actually_triggered}),
        )
    } else {
        AssertionResult::fail(
            "guardrail_triggered",
            serde_json::json!({"validator": validator, "expected": should_trigger, "actual": actually_triggered}),
        )
    }
}

fn state_is(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let expected = match assertion.params.get("state").and_then(Value::as_str) {
        Some(s) => s,
        None => return AssertionResult::error("state_is", "params.state must be a string"),
    };
    match ctx.workflow {
        None => AssertionResult::error("state_is", "no workflow state in this context"),
        Some(wf) => match &wf.current {
            Some(current) if current == expected => {
                AssertionResult::pass("state_is", serde_json::json!({"state": expected}))
            }
            Some(current) => AssertionResult::fail("state_is", serde_json::json!({"expected": expected, "actual": current})),
            None => AssertionResult::fail("state_is", serde_json::json!({"expected": expected, "actual": Value::Null})),
        },
    }
}

fn transitioned_to(assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    let expected = match assertion.params.get("state").and_then(Value::as_str) {
        Some(s) => s,
        None => return AssertionResult::error("transitioned_to", "params.state must be a string"),
    };
    match ctx.workflow {
        None => AssertionResult::error("transitioned_to", "no workflow state in this context"),
        Some(wf) if wf.history.iter().any(|s| s == expected) => {
            AssertionResult::pass("transitioned_to", serde_json::json!({"state": expected}))
        }
        Some(wf) => AssertionResult::fail(
            "transitioned_to",
            serde_json::json!({"expected": expected, "history": wf.history}),
        ),
    }
}

fn workflow_complete(_assertion: &Assertion, ctx: &AssertionContext<'_>) -> AssertionResult {
    match ctx.workflow {
        None => AssertionResult::error("workflow_complete", "no workflow state in this context"),
        Some(wf) if wf.terminal => AssertionResult::pass("workflow_complete", serde_json::json!({"terminal": true})),
        Some(wf) => AssertionResult::fail(
            "workflow_complete",
            serde_json::json!({"terminal": false, "current": wf.current}),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_domain::assertion::AssertionScope;
    use arena_domain::message::ToolCall;

    fn assertion(kind: &str, params: Value) -> Assertion {
        Assertion {
            kind: kind.to_string(),
            params,
            scope: AssertionScope::Turn,
            message: None,
        }
    }

    #[test]
    fn content_includes_is_case_insensitive_by_default() {
        let eval = AssertionEvaluator::new();
        let calls = vec![];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("It is 72°F in SF", &calls, &failures);
        let result = eval.evaluate(&assertion("content_includes", serde_json::json!({"values": ["72"]})), &ctx);
        assert!(result.passed);
    }

    #[test]
    fn content_matches_invalid_regex_errors_not_panics() {
        let eval = AssertionEvaluator::new();
        let calls = vec![];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("text", &calls, &failures);
        let result = eval.evaluate(&assertion("content_matches", serde_json::json!({"pattern": "("})), &ctx);
        assert!(!result.passed);
        assert!(result.details.get("error").is_some());
    }

    #[test]
    fn tools_called_with_subset_match() {
        let eval = AssertionEvaluator::new();
        let calls = vec![ToolCall {
            id: "c1".into(),
            name: "get_weather".into(),
            args: serde_json::json!({"city": "SF", "units": "F"}),
        }];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("", &calls, &failures);
        let result = eval.evaluate(
            &assertion("tools_called_with", serde_json::json!({"tool": "get_weather", "args": {"city": "SF"}})),
            &ctx,
        );
        assert!(result.passed);
    }

    #[test]
    fn tools_called_with_exact_rejects_superset() {
        let eval = AssertionEvaluator::new();
        let calls = vec![ToolCall {
            id: "c1".into(),
            name: "get_weather".into(),
            args: serde_json::json!({"city": "SF", "units": "F"}),
        }];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("", &calls, &failures);
        let result = eval.evaluate(
            &assertion(
                "tools_called_with",
                serde_json::json!({"tool": "get_weather", "args": {"city": "SF"}, "exact": true}),
            ),
            &ctx,
        );
        assert!(!result.passed);
    }

    #[test]
    fn guardrail_triggered_matches_expectation() {
        let eval = AssertionEvaluator::new();
        let calls = vec![];
        let mut failures = HashMap::new();
        failures.insert("banned_words".to_string(), true);
        let ctx = AssertionContext::new("", &calls, &failures);
        let result = eval.evaluate(
            &assertion("guardrail_triggered", serde_json::json!({"validator": "banned_words", "should_trigger": true})),
            &ctx,
        );
        assert!(result.passed);
    }

    #[test]
    fn workflow_assertions_require_workflow_context() {
        let eval = AssertionEvaluator::new();
        let calls = vec![];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("", &calls, &failures);
        let result = eval.evaluate(&assertion("workflow_complete", Value::Null), &ctx);
        assert!(!result.passed);
        assert!(result.details.get("error").is_some());
    }

    #[test]
    fn workflow_complete_checks_terminal_flag() {
        use crate::context::WorkflowState;
        let eval = AssertionEvaluator::new();
        let calls = vec![];
        let failures = HashMap::new();
        let wf = WorkflowState {
            current: Some("done".into()),
            history: vec!["start".into(), "done".into()],
            terminal: true,
        };
        let ctx = AssertionContext::new("", &calls, &failures).with_workflow(&wf);
        let result = eval.evaluate(&assertion("workflow_complete", Value::Null), &ctx);
        assert!(result.passed);
        let result = eval.evaluate(&assertion("transitioned_to", serde_json::json!({"state": "start"})), &ctx);
        assert!(result.passed);
        let result = eval.evaluate(&assertion("state_is", serde_json::json!({"state": "done"})), &ctx);
        assert!(result.passed);
    }

    #[test]
    fn unknown_assertion_type_errors_gracefully() {
        let eval = AssertionEvaluator::new();
        let calls = vec![];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("", &calls, &failures);
        let result = eval.evaluate(&assertion("not_a_real_type", Value::Null), &ctx);
        assert!(!result.passed);
    }

    #[test]
    fn custom_assertion_type_can_be_registered() {
        let eval = AssertionEvaluator::new();
        eval.register("always_true", |_a, _ctx| AssertionResult::pass("always_true", Value::Null));
        let calls = vec![];
        let failures = HashMap::new();
        let ctx = AssertionContext::new("", &calls, &failures);
        let result = eval.evaluate(&assertion("always_true", Value::Null), &ctx);
        assert!(result.passed);
    }
}
