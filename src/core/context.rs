//! Discovery context and the frozen catalog
//!
//! Step modules register into a [`DiscoveryContext`] while they load. Once
//! every module has loaded, [`DiscoveryContext::finish`] validates the pass
//! and hands back an immutable [`Catalog`] that graph queries, export and
//! invocation read from.

use crate::core::{
    error::{BridgeError, Result},
    graph::DependencyGraph,
    pipeline::{PipelineBuilder, PipelineDescriptor},
    registry::{check_pipeline_references, PipelineRegistry, StepRegistry},
    step::{StepBuilder, StepDefinition, StepDescriptor, StepRef},
};
use crate::export::{self, DescriptorDocument};
use std::collections::HashMap;
use tracing::{debug, info};

/// Mutable registration state for one discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryContext {
    steps: StepRegistry,
    pipelines: PipelineRegistry,
    current_module: Option<String>,
    /// Module path -> the pipeline it declared
    module_pipelines: HashMap<String, String>,
}

impl DiscoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Introspect and register a step, returning a typed handle to it
    pub fn register<R>(&mut self, definition: StepDefinition<R>) -> Result<StepRef<R>> {
        let descriptor = definition.build()?;
        let name = descriptor.name.clone();
        debug!(
            "Registering step '{}' ({} params, depends on {:?})",
            name,
            descriptor.params.len(),
            descriptor.depends_on()
        );
        self.steps.register(descriptor)?;
        Ok(StepRef::new(name))
    }

    /// Register a pipeline. A module may declare at most one.
    pub fn register_pipeline(&mut self, builder: PipelineBuilder) -> Result<PipelineRef> {
        let mut descriptor = builder.build()?;

        if let Some(module) = &self.current_module {
            if let Some(existing) = self.module_pipelines.get(module) {
                return Err(BridgeError::ModuleImportError {
                    module: module.clone(),
                    reason: format!(
                        "declares pipeline '{}' after '{}'; a module may declare at most one pipeline",
                        descriptor.name, existing
                    ),
                });
            }
            descriptor.module_path = Some(module.clone());
        }

        let name = descriptor.name.clone();
        debug!("Registering pipeline '{}'", name);
        self.pipelines.register(descriptor)?;
        if let Some(module) = &self.current_module {
            self.module_pipelines.insert(module.clone(), name.clone());
        }
        Ok(PipelineRef { name })
    }

    /// Mark the start of a module's registrations
    pub fn enter_module(&mut self, path: impl Into<String>) {
        self.current_module = Some(path.into());
    }

    pub fn leave_module(&mut self) {
        self.current_module = None;
    }

    pub fn current_module(&self) -> Option<&str> {
        self.current_module.as_deref()
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    /// End the pass: every pipeline reference must resolve and the graph
    /// must build
    pub fn finish(self) -> Result<Catalog> {
        check_pipeline_references(&self.steps, &self.pipelines)?;
        let graph = DependencyGraph::build(&self.steps)?;
        info!(
            "Discovery finished: {} steps, {} pipelines, {} edges",
            self.steps.len(),
            self.pipelines.len(),
            graph.edges().len()
        );
        Ok(Catalog {
            steps: self.steps,
            pipelines: self.pipelines,
            graph,
        })
    }
}

/// Handle to a registered pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRef {
    name: String,
}

impl PipelineRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start declaring a step bound to this pipeline
    #[track_caller]
    pub fn step(&self, name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(name).pipeline(self.name.clone())
    }
}

/// Immutable snapshot of one discovery pass. Safe to share across threads.
#[derive(Debug)]
pub struct Catalog {
    steps: StepRegistry,
    pipelines: PipelineRegistry,
    graph: DependencyGraph,
}

impl Catalog {
    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn step(&self, name: &str) -> Result<&StepDescriptor> {
        self.steps.get(name)
    }

    pub fn pipeline(&self, name: &str) -> Result<&PipelineDescriptor> {
        self.pipelines.get(name)
    }

    /// Steps bound to `pipeline`, in registration order
    pub fn steps_in_pipeline<'a>(
        &'a self,
        pipeline: &'a str,
    ) -> impl Iterator<Item = &'a StepDescriptor> + 'a {
        self.steps
            .all()
            .filter(move |s| s.pipeline.as_deref() == Some(pipeline))
    }

    /// Descriptor document for the external orchestrator
    pub fn export(&self) -> Result<DescriptorDocument> {
        export::document(&self.steps, &self.pipelines, &self.graph)
    }
}
