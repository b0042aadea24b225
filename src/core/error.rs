//! Error taxonomy for discovery, graph building and invocation

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where a step was declared (file + line of the registration call)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    /// Capture the location of the caller
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file().replace('\\', "/"),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A value that did not fit its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    /// JSON path of the offending value (`$` is the root)
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at {}: expected {}, found {}",
            self.path, self.expected, self.actual
        )
    }
}

/// Every failure the core can report.
///
/// Definition-time variants abort the discovery pass. Invocation-time variants
/// only fail the call that produced them.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("duplicate step name '{name}'{}", at(.location))]
    DuplicateStepName {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("duplicate pipeline name '{name}'")]
    DuplicatePipelineName { name: String },

    #[error("schema mismatch in step '{step}', parameter '{param}': {reason}")]
    SchemaMismatch {
        step: String,
        param: String,
        reason: String,
    },

    #[error("unsupported type in step '{step}', parameter '{param}': {reason}")]
    UnsupportedType {
        step: String,
        param: String,
        reason: String,
    },

    #[error("step '{step}' belongs to pipeline '{pipeline}', which was never registered")]
    DanglingPipelineReference { step: String, pipeline: String },

    /// Each step in `cycle` depends on the next one; the first and last entries are equal
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("failed to import module '{module}': {reason}")]
    ModuleImportError { module: String, reason: String },

    #[error("invalid option for {subject}: {reason}")]
    InvalidOption { subject: String, reason: String },

    #[error("invalid webhook '{webhook}' on pipeline '{pipeline}': {reason}")]
    InvalidWebhook {
        pipeline: String,
        webhook: String,
        reason: String,
    },

    #[error("step '{name}' not found")]
    StepNotFound { name: String },

    #[error("pipeline '{name}' not found")]
    PipelineNotFound { name: String },

    #[error(
        "step '{step}' needs the result of '{upstream}' for parameter '{param}', but no such result was supplied"
    )]
    MissingUpstreamResult {
        step: String,
        param: String,
        upstream: String,
    },

    #[error("invalid input for step '{step}', parameter '{param}' {mismatch}")]
    InputValidationError {
        step: String,
        param: String,
        mismatch: ShapeMismatch,
    },

    #[error("step '{step}' returned a value that breaks its return schema {mismatch}")]
    OutputValidationError { step: String, mismatch: ShapeMismatch },

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("invalid JSON in {what}: {source}")]
    InvalidJson {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

fn at(location: &Option<SourceLocation>) -> String {
    match location {
        Some(location) => format!(" (declared at {})", location),
        None => String::new(),
    }
}

impl BridgeError {
    /// Stable, machine-readable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::DuplicateStepName { .. } => "duplicate_step_name",
            BridgeError::DuplicatePipelineName { .. } => "duplicate_pipeline_name",
            BridgeError::SchemaMismatch { .. } => "schema_mismatch",
            BridgeError::UnsupportedType { .. } => "unsupported_type",
            BridgeError::DanglingPipelineReference { .. } => "dangling_pipeline_reference",
            BridgeError::CyclicDependency { .. } => "cyclic_dependency",
            BridgeError::UnknownDependency { .. } => "unknown_dependency",
            BridgeError::ModuleImportError { .. } => "module_import_error",
            BridgeError::InvalidOption { .. } => "invalid_option",
            BridgeError::InvalidWebhook { .. } => "invalid_webhook",
            BridgeError::StepNotFound { .. } => "step_not_found",
            BridgeError::PipelineNotFound { .. } => "pipeline_not_found",
            BridgeError::MissingUpstreamResult { .. } => "missing_upstream_result",
            BridgeError::InputValidationError { .. } => "input_validation_error",
            BridgeError::OutputValidationError { .. } => "output_validation_error",
            BridgeError::StepFailed { .. } => "step_failed",
            BridgeError::InvalidJson { .. } => "invalid_json",
        }
    }

    /// Whether this error belongs to the definition phase (fatal to discovery)
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            BridgeError::DuplicateStepName { .. }
                | BridgeError::DuplicatePipelineName { .. }
                | BridgeError::SchemaMismatch { .. }
                | BridgeError::UnsupportedType { .. }
                | BridgeError::DanglingPipelineReference { .. }
                | BridgeError::CyclicDependency { .. }
                | BridgeError::UnknownDependency { .. }
                | BridgeError::ModuleImportError { .. }
                | BridgeError::InvalidOption { .. }
                | BridgeError::InvalidWebhook { .. }
        )
    }

    pub(crate) fn invalid_json(what: impl Into<String>, source: serde_json::Error) -> Self {
        BridgeError::InvalidJson {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
