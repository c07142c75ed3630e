//! Streaming pipeline / stage substrate: the composable chain of
//! stages that drives one turn of a conversation through state-load,
//! prompt-assembly, template substitution, validation, provider
//! invocation (with its multi-round tool loop), and state-save.

mod cancel;
mod context;
mod element;
mod pipeline;
mod stage;
mod stages;

pub use cancel::CancelToken;
pub use context::{shared, CostAccumulator, EventSink, ExecutionContext, NoopEventSink, SharedContext};
pub use element::{ElementError, ElementPayload, MediaFragment, MediaKind, StreamElement};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineOutcome, PipelineRun};
pub use stage::{recv_checked, send_checked, passthrough, ElementReceiver, ElementSender, Stage, StageKind};
pub use stages::{
    PromptAssemblyStage, ProviderStage, StateLoadStage, StateSaveStage, StaticVariableProvider, TemplateStage,
    ValidationMode, ValidationStage, VariableProvider,
};
