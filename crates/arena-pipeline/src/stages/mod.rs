//! The six standard stages, in their recommended order:
//! state-load, prompt-assembly, template, validation, provider,
//! state-save.

mod prompt_assembly;
mod provider;
mod state_load;
mod state_save;
mod template;
mod validation;

pub use prompt_assembly::PromptAssemblyStage;
pub use provider::ProviderStage;
pub use state_load::StateLoadStage;
pub use state_save::StateSaveStage;
pub use template::{StaticVariableProvider, TemplateStage, VariableProvider};
pub use validation::{ValidationMode, ValidationStage};
