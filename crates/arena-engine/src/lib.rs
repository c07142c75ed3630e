//! Scenario engine, event bus, result aggregation, and mock scaffolding
//! for running prompt-regression scenarios across providers.

pub mod events;
pub mod mock;
pub mod result;
pub mod scenario;

pub use events::{EventBus, EventBusSink, Listener};
pub use mock::Recorder;
pub use result::{dedupe_by_fingerprint, ResultSummary};
pub use scenario::ScenarioEngine;
