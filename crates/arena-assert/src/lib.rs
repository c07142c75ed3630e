//! Assertion evaluator: a closed set of built-in, type-tagged
//! assertions plus a registration hook for custom types. Never throws —
//! parse/lookup failures become `passed=false` with `details.error`,
//! mirroring `Config::validate`'s accumulate-don't-throw discipline.

mod context;
mod evaluator;

pub use context::{AssertionContext, WorkflowState};
pub use evaluator::AssertionEvaluator;
