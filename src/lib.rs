//! bridge-steps - typed step registry, dependency resolver and single-step runner

pub mod cli;
pub mod core;
pub mod demos;
pub mod discovery;
pub mod execution;
pub mod export;

// Re-export commonly used types
pub use core::{
    BridgeError, Catalog, Dependency, DiscoveryContext, PipelineBuilder, Schema,
    StepArgs, StepBuilder, StepRef, Webhook, WebhookProvider,
};
pub use discovery::{discover, ModuleCatalog, StepModule};
pub use execution::{InvocationOutcome, StepInvoker};
pub use export::{export, DescriptorDocument};
