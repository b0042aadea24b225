//! Descriptor document export
//!
//! The document is the wire contract read by the external orchestrator.
//! Maps are keyed by name and serialize in sorted order, so the same
//! registries always produce byte-identical JSON.

use crate::core::{
    error::{BridgeError, Result},
    graph::DependencyGraph,
    pipeline::{PipelineDescriptor, Webhook},
    registry::{check_pipeline_references, PipelineRegistry, StepRegistry},
    schema::{Schema, SchemaField},
    step::{SandboxDefinition, StepDescriptor},
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything the orchestrator needs to plan runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorDocument {
    pub steps: BTreeMap<String, StepEntry>,
    pub pipelines: BTreeMap<String, PipelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEntry {
    pub name: String,
    pub rid: Uuid,
    pub pipeline: Option<String>,
    pub description: Option<String>,
    /// Distinct upstream step names
    pub depends_on: Vec<String>,
    /// Parameter name -> upstream step name
    pub params_from_step_results: BTreeMap<String, String>,
    pub params_json_schema: Value,
    pub return_json_schema: Value,
    pub credential_bindings: BTreeMap<String, String>,
    pub setup_script: Option<String>,
    pub post_execution_script: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub execution_environment_id: Option<String>,
    pub sandbox_definition: Option<SandboxDefinition>,
    pub file_path: Option<String>,
    pub file_line_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEntry {
    pub name: String,
    pub rid: Uuid,
    pub description: Option<String>,
    pub module_path: Option<String>,
    pub webhooks: Vec<Webhook>,
    /// Steps bound to the pipeline, in registration order
    pub steps: Vec<String>,
    /// Step -> upstream steps within the pipeline
    pub dag: BTreeMap<String, Vec<String>>,
    pub root_steps: Vec<String>,
    pub leaf_steps: Vec<String>,
    /// Root step -> its parameter schema
    pub input_json_schema: BTreeMap<String, Value>,
    /// Leaf step -> its return schema
    pub output_json_schema: BTreeMap<String, Value>,
}

/// Build the graph, then the document. Nothing is produced for an invalid
/// graph or a dangling pipeline reference.
pub fn export(steps: &StepRegistry, pipelines: &PipelineRegistry) -> Result<DescriptorDocument> {
    check_pipeline_references(steps, pipelines)?;
    let graph = DependencyGraph::build(steps)?;
    document(steps, pipelines, &graph)
}

/// Assemble the document from a graph already built over `steps`
pub(crate) fn document(
    steps: &StepRegistry,
    pipelines: &PipelineRegistry,
    graph: &DependencyGraph,
) -> Result<DescriptorDocument> {
    let step_entries: BTreeMap<String, StepEntry> = steps
        .all()
        .map(|step| (step.name.clone(), step_entry(step)))
        .collect();

    let mut pipeline_entries = BTreeMap::new();
    for pipeline in pipelines.all() {
        let entry = pipeline_entry(pipeline, steps, graph, &step_entries)?;
        pipeline_entries.insert(pipeline.name.clone(), entry);
    }

    Ok(DescriptorDocument {
        steps: step_entries,
        pipelines: pipeline_entries,
    })
}

/// Object schema over every parameter, titled `<step>_args`
pub fn params_schema(step: &StepDescriptor) -> Schema {
    Schema::Record {
        title: format!("{}_args", step.name),
        fields: step
            .params
            .iter()
            .map(|p| SchemaField {
                name: p.name.clone(),
                schema: p.schema.clone(),
                description: None,
                required: !p.schema.is_optional(),
            })
            .collect(),
    }
}

fn step_entry(step: &StepDescriptor) -> StepEntry {
    StepEntry {
        name: step.name.clone(),
        rid: step.stable_id,
        pipeline: step.pipeline.clone(),
        description: step.description.clone(),
        depends_on: step.depends_on(),
        params_from_step_results: step
            .params_from_upstream()
            .map(|(param, upstream)| (param.to_string(), upstream.to_string()))
            .collect(),
        params_json_schema: params_schema(step).to_json_schema(),
        return_json_schema: step.return_schema.to_json_schema(),
        credential_bindings: step.credential_bindings.clone(),
        setup_script: step.setup_script.clone(),
        post_execution_script: step.post_execution_script.clone(),
        metadata: step.metadata.clone(),
        execution_environment_id: step.execution_environment_id.clone(),
        sandbox_definition: step.sandbox_definition.clone(),
        file_path: step.source.as_ref().map(|s| s.file.clone()),
        file_line_number: step.source.as_ref().map(|s| s.line),
    }
}

fn pipeline_entry(
    pipeline: &PipelineDescriptor,
    steps: &StepRegistry,
    graph: &DependencyGraph,
    step_entries: &BTreeMap<String, StepEntry>,
) -> Result<PipelineEntry> {
    let members: Vec<String> = steps
        .all()
        .filter(|s| s.pipeline.as_deref() == Some(pipeline.name.as_str()))
        .map(|s| s.name.clone())
        .collect();
    let dag = graph.restrict(|name| members.iter().any(|m| m == name));

    let root_steps: Vec<String> = dag.roots().into_iter().map(String::from).collect();
    let leaf_steps: Vec<String> = dag.leaves().into_iter().map(String::from).collect();

    let entry_for = |name: &str| {
        step_entries
            .get(name)
            .ok_or_else(|| BridgeError::StepNotFound {
                name: name.to_string(),
            })
    };

    let mut input_json_schema = BTreeMap::new();
    for name in &root_steps {
        input_json_schema.insert(name.clone(), entry_for(name)?.params_json_schema.clone());
    }
    let mut output_json_schema = BTreeMap::new();
    for name in &leaf_steps {
        output_json_schema.insert(name.clone(), entry_for(name)?.return_json_schema.clone());
    }

    Ok(PipelineEntry {
        name: pipeline.name.clone(),
        rid: pipeline.stable_id,
        description: pipeline.description.clone(),
        module_path: pipeline.module_path.clone(),
        webhooks: pipeline.webhooks.clone(),
        steps: members,
        dag: dag.adjacency(),
        root_steps,
        leaf_steps,
        input_json_schema,
        output_json_schema,
    })
}

impl DescriptorDocument {
    /// Pretty-printed JSON, two-space indent
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::invalid_json("descriptor document", e))
    }
}
