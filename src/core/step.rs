//! Step domain model
//!
//! A step is declared with a [`StepBuilder`]: direct input and upstream-marked
//! parameters are added with their Rust types, then an async handler is bound.
//! Building inspects those declarations and produces a [`StepDescriptor`]
//! carrying the generated schemas, the upstream markers and the handler.

use crate::core::{
    error::{BridgeError, Result, SourceLocation},
    identity::{resolve_stable_id, validate_name, EntityKind},
    schema::{Schema, SchemaSite},
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Marker on a parameter: "this value is the result of step `step`".
///
/// `T` is the type the parameter is declared with. Built from a
/// [`StepRef<T>`] the compiler guarantees it matches the upstream return
/// type; built from a bare name the match is checked when the graph is built.
pub struct Dependency<T> {
    step: String,
    _type: PhantomData<fn() -> T>,
}

impl<T> Dependency<T> {
    /// Refer to an upstream step by name
    pub fn on(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            _type: PhantomData,
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }
}

impl<T> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        Self::on(self.step.clone())
    }
}

impl<T> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dependency").field(&self.step).finish()
    }
}

/// Typed handle to a registered step returning `R`
pub struct StepRef<R> {
    name: String,
    _type: PhantomData<fn() -> R>,
}

impl<R> StepRef<R> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// The registered step name (after any override)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A marker consuming this step's result
    pub fn result(&self) -> Dependency<R> {
        Dependency::on(self.name.clone())
    }
}

impl<R> Clone for StepRef<R> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<R> fmt::Debug for StepRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StepRef").field(&self.name).finish()
    }
}

/// Inline execution environment for a step. Opaque to the core apart from
/// requiring an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxDefinition {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_limit: Option<String>,
}

impl SandboxDefinition {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }
}

/// Arguments handed to a step handler, already validated against the
/// parameter schemas
#[derive(Debug, Clone, Default)]
pub struct StepArgs {
    values: HashMap<String, Value>,
}

impl StepArgs {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Deserialize parameter `name` into `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no argument named '{}'", name))?;
        serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("argument '{}' could not be decoded: {}", name, e))
    }

    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why a handler produced no result
#[derive(Debug)]
pub enum HandlerError {
    /// The step body returned an error
    Failed(anyhow::Error),
    /// The returned value could not be serialized
    Serialize(serde_json::Error),
}

/// The callable behind a step. Implemented for async closures and functions
/// through [`StepBuilder::handler`].
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn call(&self, args: StepArgs) -> Result<Value, HandlerError>;
}

struct FnHandler<F, R> {
    func: F,
    _returns: PhantomData<fn() -> R>,
}

#[async_trait]
impl<F, Fut, R> StepHandler for FnHandler<F, R>
where
    F: Fn(StepArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<R>> + Send,
    R: Serialize + Send,
{
    async fn call(&self, args: StepArgs) -> Result<Value, HandlerError> {
        let output = (self.func)(args).await.map_err(HandlerError::Failed)?;
        serde_json::to_value(&output).map_err(HandlerError::Serialize)
    }
}

/// A declared parameter after introspection
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub schema: Schema,
    /// Upstream step whose result feeds this parameter
    pub upstream: Option<String>,
}

impl ParamDescriptor {
    pub fn is_direct_input(&self) -> bool {
        self.upstream.is_none()
    }
}

/// Everything known about a registered step
#[derive(Clone)]
pub struct StepDescriptor {
    pub name: String,
    pub stable_id: Uuid,
    pub description: Option<String>,
    pub pipeline: Option<String>,
    pub params: Vec<ParamDescriptor>,
    pub return_schema: Schema,
    /// Credential identifier -> environment variable name
    pub credential_bindings: BTreeMap<String, String>,
    pub setup_script: Option<String>,
    pub post_execution_script: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub execution_environment_id: Option<String>,
    pub sandbox_definition: Option<SandboxDefinition>,
    pub source: Option<SourceLocation>,
    handler: Arc<dyn StepHandler>,
}

impl StepDescriptor {
    /// Parameter name -> upstream step name, in parameter order
    pub fn params_from_upstream(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params
            .iter()
            .filter_map(|p| p.upstream.as_deref().map(|u| (p.name.as_str(), u)))
    }

    /// Distinct upstream steps, in the order they are first referenced
    pub fn depends_on(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for (_, upstream) in self.params_from_upstream() {
            if !deps.iter().any(|d| d == upstream) {
                deps.push(upstream.to_string());
            }
        }
        deps
    }

    /// The unmarked parameter fed from the raw input, if any
    pub fn direct_input(&self) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.is_direct_input())
    }

    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn handler(&self) -> &Arc<dyn StepHandler> {
        &self.handler
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .field("stable_id", &self.stable_id)
            .field("pipeline", &self.pipeline)
            .field("params", &self.params)
            .field("return_schema", &self.return_schema)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct PendingParam {
    name: String,
    json_schema: schemars::Schema,
    upstream: Option<String>,
}

/// Declares a step. Finish with [`StepBuilder::handler`].
#[derive(Debug, Clone)]
pub struct StepBuilder {
    name: String,
    stable_id: Option<String>,
    description: Option<String>,
    pipeline: Option<String>,
    params: Vec<PendingParam>,
    credential_bindings: BTreeMap<String, String>,
    setup_script: Option<String>,
    post_execution_script: Option<String>,
    metadata: BTreeMap<String, Value>,
    execution_environment_id: Option<String>,
    sandbox_definition: Option<SandboxDefinition>,
    source: SourceLocation,
}

impl StepBuilder {
    /// Start declaring step `name`. The caller's file and line are recorded.
    #[track_caller]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stable_id: None,
            description: None,
            pipeline: None,
            params: Vec::new(),
            credential_bindings: BTreeMap::new(),
            setup_script: None,
            post_execution_script: None,
            metadata: BTreeMap::new(),
            execution_environment_id: None,
            sandbox_definition: None,
            source: SourceLocation::caller(),
        }
    }

    pub fn stable_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// The parameter fed from the raw invocation input
    pub fn input<T: JsonSchema>(mut self, name: impl Into<String>) -> Self {
        self.params.push(PendingParam {
            name: name.into(),
            json_schema: schemars::schema_for!(T),
            upstream: None,
        });
        self
    }

    /// A parameter fed from an upstream step's result
    pub fn param_from<T: JsonSchema>(mut self, name: impl Into<String>, dependency: Dependency<T>) -> Self {
        self.params.push(PendingParam {
            name: name.into(),
            json_schema: schemars::schema_for!(T),
            upstream: Some(dependency.step),
        });
        self
    }

    pub fn credential(mut self, credential_id: impl Into<String>, env_var: impl Into<String>) -> Self {
        self.credential_bindings
            .insert(credential_id.into(), env_var.into());
        self
    }

    pub fn setup_script(mut self, path: impl Into<String>) -> Self {
        self.setup_script = Some(path.into());
        self
    }

    pub fn post_execution_script(mut self, path: impl Into<String>) -> Self {
        self.post_execution_script = Some(path.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn execution_environment(mut self, id: impl Into<String>) -> Self {
        self.execution_environment_id = Some(id.into());
        self
    }

    pub fn sandbox(mut self, sandbox: SandboxDefinition) -> Self {
        self.sandbox_definition = Some(sandbox);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the step body. Its return type `R` becomes the step's return type.
    pub fn handler<F, Fut, R>(self, func: F) -> StepDefinition<R>
    where
        F: Fn(StepArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + JsonSchema + Send + 'static,
    {
        StepDefinition {
            builder: self,
            return_schema: schemars::schema_for!(R),
            handler: Arc::new(FnHandler {
                func,
                _returns: PhantomData::<fn() -> R>,
            }),
            _returns: PhantomData,
        }
    }
}

/// A fully declared step, ready to be registered
pub struct StepDefinition<R> {
    builder: StepBuilder,
    return_schema: schemars::Schema,
    handler: Arc<dyn StepHandler>,
    _returns: PhantomData<fn() -> R>,
}

impl<R> StepDefinition<R> {
    pub fn name(&self) -> &str {
        &self.builder.name
    }

    /// Introspect the declaration into a descriptor.
    ///
    /// Fails with `SchemaMismatch` when more than one parameter is unmarked or
    /// a parameter name repeats, with `UnsupportedType` when a parameter or
    /// the return type has no fixed shape, and with `InvalidOption` for a
    /// malformed name, stable id or sandbox.
    pub fn build(self) -> Result<StepDescriptor> {
        let StepBuilder {
            name,
            stable_id,
            description,
            pipeline,
            params,
            credential_bindings,
            setup_script,
            post_execution_script,
            metadata,
            execution_environment_id,
            sandbox_definition,
            source,
        } = self.builder;

        validate_name(EntityKind::Step, &name)?;
        let stable_id = resolve_stable_id(EntityKind::Step, &name, stable_id.as_deref())?;

        if let Some(sandbox) = &sandbox_definition {
            if sandbox.image.trim().is_empty() {
                return Err(BridgeError::InvalidOption {
                    subject: EntityKind::Step.subject(&name),
                    reason: "sandbox definition needs a non-empty image".to_string(),
                });
            }
        }

        let mut resolved: Vec<ParamDescriptor> = Vec::with_capacity(params.len());
        for param in params {
            if resolved.iter().any(|p| p.name == param.name) {
                return Err(BridgeError::SchemaMismatch {
                    step: name.clone(),
                    param: param.name,
                    reason: "parameter is declared more than once".to_string(),
                });
            }
            if param.upstream.is_none() {
                if let Some(existing) = resolved.iter().find(|p| p.is_direct_input()) {
                    return Err(BridgeError::SchemaMismatch {
                        step: name.clone(),
                        param: param.name,
                        reason: format!(
                            "only one parameter may take the direct input and '{}' already does; \
                             mark this one with the step whose result it consumes",
                            existing.name
                        ),
                    });
                }
            }
            let schema = Schema::from_json_schema(
                &param.json_schema,
                SchemaSite {
                    step: &name,
                    param: &param.name,
                },
            )?;
            resolved.push(ParamDescriptor {
                name: param.name,
                schema,
                upstream: param.upstream,
            });
        }

        let return_schema = Schema::from_json_schema(
            &self.return_schema,
            SchemaSite {
                step: &name,
                param: "<return>",
            },
        )?;

        Ok(StepDescriptor {
            name,
            stable_id,
            description,
            pipeline,
            params: resolved,
            return_schema,
            credential_bindings,
            setup_script,
            post_execution_script,
            metadata,
            execution_environment_id,
            sandbox_definition,
            source: Some(source),
            handler: self.handler,
        })
    }
}
