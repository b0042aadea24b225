//! Pipeline domain model

use crate::core::{
    error::{BridgeError, Result},
    identity::{resolve_stable_id, validate_name, EntityKind},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Where a webhook delivery comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookProvider {
    Github,
    Linear,
    GenericHmacSha1,
    GenericHmacSha256,
}

impl WebhookProvider {
    /// Generic providers carry no delivery id of their own, so the
    /// deduplication key has to be spelled out
    pub fn requires_idempotency_key(self) -> bool {
        matches!(
            self,
            WebhookProvider::GenericHmacSha1 | WebhookProvider::GenericHmacSha256
        )
    }
}

/// Trigger definition attached to a pipeline.
///
/// The expressions are opaque to this crate; they are evaluated by the
/// orchestrator that consumes the exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub name: String,
    pub branch: String,
    /// Boolean expression selecting deliveries to act on
    pub filter: String,
    /// Expression producing the deduplication key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub provider: WebhookProvider,
    /// Expression producing a step name -> input map
    pub transform: String,
}

impl Webhook {
    pub fn new(
        name: impl Into<String>,
        branch: impl Into<String>,
        provider: WebhookProvider,
    ) -> Self {
        Self {
            name: name.into(),
            branch: branch.into(),
            filter: "true".to_string(),
            idempotency_key: None,
            provider,
            transform: String::new(),
        }
    }

    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = expression.into();
        self
    }

    pub fn idempotency_key(mut self, expression: impl Into<String>) -> Self {
        self.idempotency_key = Some(expression.into());
        self
    }

    pub fn transform(mut self, expression: impl Into<String>) -> Self {
        self.transform = expression.into();
        self
    }

    fn validate(&self, pipeline: &str) -> Result<()> {
        let invalid = |reason: &str| BridgeError::InvalidWebhook {
            pipeline: pipeline.to_string(),
            webhook: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.branch.trim().is_empty() {
            return Err(invalid("branch must not be empty"));
        }
        if self.filter.trim().is_empty() {
            return Err(invalid("filter expression must not be empty"));
        }
        if self.transform.trim().is_empty() {
            return Err(invalid("transform expression must not be empty"));
        }
        if self.provider.requires_idempotency_key()
            && self
                .idempotency_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(invalid("generic providers need an idempotency key expression"));
        }
        Ok(())
    }
}

/// A registered pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescriptor {
    pub name: String,
    pub stable_id: Uuid,
    pub description: Option<String>,
    /// Module that declared the pipeline, when declared during discovery
    pub module_path: Option<String>,
    pub webhooks: Vec<Webhook>,
}

/// Declares a pipeline
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stable_id: Option<String>,
    description: Option<String>,
    webhooks: Vec<Webhook>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stable_id: None,
            description: None,
            webhooks: Vec::new(),
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

    pub fn webhook(mut self, webhook: Webhook) -> Self {
        self.webhooks.push(webhook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate and freeze the declaration
    pub fn build(self) -> Result<PipelineDescriptor> {
        validate_name(EntityKind::Pipeline, &self.name)?;
        let stable_id =
            resolve_stable_id(EntityKind::Pipeline, &self.name, self.stable_id.as_deref())?;

        let mut seen = HashSet::new();
        for webhook in &self.webhooks {
            webhook.validate(&self.name)?;
            if !seen.insert((webhook.branch.as_str(), webhook.name.as_str())) {
                return Err(BridgeError::InvalidWebhook {
                    pipeline: self.name.clone(),
                    webhook: webhook.name.clone(),
                    reason: format!("declared twice for branch '{}'", webhook.branch),
                });
            }
        }

        Ok(PipelineDescriptor {
            name: self.name,
            stable_id,
            description: self.description,
            module_path: None,
            webhooks: self.webhooks,
        })
    }
}
