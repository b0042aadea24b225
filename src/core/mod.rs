//! Core domain models
//!
//! Steps, pipelines, their schemas and registries, the dependency graph
//! derived from them, and the discovery context that ties them together.

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod identity;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod step;

pub use context::{Catalog, DiscoveryContext, PipelineRef};
pub use error::{BridgeError, Result};
pub use graph::{DependencyGraph, Edge};
pub use pipeline::{PipelineBuilder, PipelineDescriptor, Webhook, WebhookProvider};
pub use registry::{PipelineRegistry, StepRegistry};
pub use schema::{Schema, SchemaSite};
pub use step::{
    Dependency, SandboxDefinition, StepArgs, StepBuilder, StepDefinition, StepDescriptor, StepRef,
};
