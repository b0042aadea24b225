//! Step and pipeline registries
//!
//! Both registries keep insertion order and never update or remove an entry.
//! A new discovery pass starts from empty registries.

use crate::core::{
    error::{BridgeError, Result},
    pipeline::PipelineDescriptor,
    step::StepDescriptor,
};
use std::collections::HashMap;

/// Step name -> descriptor
#[derive(Debug, Default, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
    index: HashMap<String, usize>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step; its name must not already be taken
    pub fn register(&mut self, step: StepDescriptor) -> Result<()> {
        if self.index.contains_key(&step.name) {
            return Err(BridgeError::DuplicateStepName {
                name: step.name.clone(),
                location: step.source.clone(),
            });
        }
        self.index.insert(step.name.clone(), self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&StepDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| BridgeError::StepNotFound {
                name: name.to_string(),
            })
    }

    /// Steps in registration order. Each call starts a fresh iteration.
    pub fn all(&self) -> std::slice::Iter<'_, StepDescriptor> {
        self.steps.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Pipeline name -> descriptor
#[derive(Debug, Default, Clone)]
pub struct PipelineRegistry {
    pipelines: Vec<PipelineDescriptor>,
    index: HashMap<String, usize>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pipeline: PipelineDescriptor) -> Result<()> {
        if self.index.contains_key(&pipeline.name) {
            return Err(BridgeError::DuplicatePipelineName {
                name: pipeline.name.clone(),
            });
        }
        self.index.insert(pipeline.name.clone(), self.pipelines.len());
        self.pipelines.push(pipeline);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&PipelineDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.pipelines[i])
            .ok_or_else(|| BridgeError::PipelineNotFound {
                name: name.to_string(),
            })
    }

    pub fn all(&self) -> std::slice::Iter<'_, PipelineDescriptor> {
        self.pipelines.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Every step naming a pipeline must name a registered one
pub fn check_pipeline_references(steps: &StepRegistry, pipelines: &PipelineRegistry) -> Result<()> {
    for step in steps.all() {
        if let Some(pipeline) = &step.pipeline {
            if !pipelines.contains(pipeline) {
                return Err(BridgeError::DanglingPipelineReference {
                    step: step.name.clone(),
                    pipeline: pipeline.clone(),
                });
            }
        }
    }
    Ok(())
}
