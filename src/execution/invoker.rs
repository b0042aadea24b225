//! Step invoker - runs one step in isolation
//!
//! Arguments are resolved from the raw input and the cached results of
//! upstream steps, validated against the parameter schemas, handed to the
//! step's handler, and the returned value is checked against the return
//! schema. Each phase is terminal on failure; there is no timeout and no
//! retry here.

use crate::core::{
    context::Catalog,
    error::{BridgeError, Result, ShapeMismatch},
    step::{HandlerError, StepArgs, StepDescriptor},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a successful invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub step: String,
    /// The serialized return value, already validated
    pub value: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl InvocationOutcome {
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Invokes steps from a frozen catalog. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct StepInvoker {
    catalog: Arc<Catalog>,
}

impl StepInvoker {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Map every declared parameter to a validated value.
    ///
    /// A marked parameter takes `upstream[marker]`, unless `raw_input` is an
    /// object with a top-level key equal to the parameter name: that value
    /// wins. The unmarked parameter takes `raw_input` itself.
    pub fn resolve_arguments(
        &self,
        step: &StepDescriptor,
        raw_input: &Value,
        upstream: &HashMap<String, Value>,
    ) -> Result<StepArgs> {
        let overrides = raw_input.as_object();
        let mut values = HashMap::with_capacity(step.params.len());

        for param in &step.params {
            let value = match &param.upstream {
                Some(upstream_step) => {
                    match overrides.and_then(|o| o.get(&param.name)) {
                        Some(explicit) => {
                            if upstream.contains_key(upstream_step) {
                                warn!(
                                    "Raw input for '{}.{}' overrides the cached result of '{}'",
                                    step.name, param.name, upstream_step
                                );
                            }
                            explicit.clone()
                        }
                        None => upstream
                            .get(upstream_step)
                            .cloned()
                            .ok_or_else(|| BridgeError::MissingUpstreamResult {
                                step: step.name.clone(),
                                param: param.name.clone(),
                                upstream: upstream_step.clone(),
                            })?,
                    }
                }
                None => raw_input.clone(),
            };

            param
                .schema
                .validate(&value)
                .map_err(|mismatch| BridgeError::InputValidationError {
                    step: step.name.clone(),
                    param: param.name.clone(),
                    mismatch,
                })?;

            debug!("Resolved '{}.{}' = {}", step.name, param.name, value);
            values.insert(param.name.clone(), value);
        }

        Ok(StepArgs::new(values))
    }

    /// Resolve, execute, then check the result of step `step_name`
    pub async fn invoke(
        &self,
        step_name: &str,
        raw_input: &Value,
        upstream: &HashMap<String, Value>,
    ) -> Result<InvocationOutcome> {
        let step = self.catalog.step(step_name)?;
        let args = self.resolve_arguments(step, raw_input, upstream)?;

        info!("Invoking step: {}", step.name);
        let started_at = Utc::now();

        let value = match step.handler().call(args).await {
            Ok(value) => value,
            Err(HandlerError::Failed(e)) => {
                error!("Step {} failed: {:#}", step.name, e);
                return Err(BridgeError::StepFailed {
                    step: step.name.clone(),
                    message: format!("{:#}", e),
                });
            }
            Err(HandlerError::Serialize(e)) => {
                return Err(BridgeError::OutputValidationError {
                    step: step.name.clone(),
                    mismatch: ShapeMismatch {
                        path: "$".to_string(),
                        expected: step.return_schema.shape(),
                        actual: format!("a value that failed to serialize ({})", e),
                    },
                });
            }
        };

        step.return_schema
            .validate(&value)
            .map_err(|mismatch| BridgeError::OutputValidationError {
                step: step.name.clone(),
                mismatch,
            })?;

        let completed_at = Utc::now();
        info!(
            "Step {} completed in {}ms",
            step.name,
            (completed_at - started_at).num_milliseconds()
        );

        Ok(InvocationOutcome {
            step: step.name.clone(),
            value,
            started_at,
            completed_at,
        })
    }

    /// [`invoke`](Self::invoke) with the input and the cached results given
    /// as JSON text
    pub async fn invoke_json(
        &self,
        step_name: &str,
        raw_input: &str,
        upstream: &str,
    ) -> Result<InvocationOutcome> {
        let raw_input: Value = serde_json::from_str(raw_input)
            .map_err(|e| BridgeError::invalid_json("step input", e))?;
        let upstream: HashMap<String, Value> = serde_json::from_str(upstream)
            .map_err(|e| BridgeError::invalid_json("step results", e))?;
        self.invoke(step_name, &raw_input, &upstream).await
    }
}
