//! Alert handling behind a generic HMAC webhook

use crate::core::{
    context::DiscoveryContext,
    error::Result,
    pipeline::{PipelineBuilder, Webhook, WebhookProvider},
    step::{SandboxDefinition, StepArgs},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AlertInput {
    pub alert_id: String,
    pub service: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AlertResult {
    pub acknowledged: bool,
}

async fn handle_alert(args: StepArgs) -> anyhow::Result<AlertResult> {
    let alert: AlertInput = args.get("input_data")?;
    info!("Alert {} from {}: {}", alert.alert_id, alert.service, alert.message);
    Ok(AlertResult { acknowledged: true })
}

pub fn register(ctx: &mut DiscoveryContext) -> Result<()> {
    let pipeline = ctx.register_pipeline(
        PipelineBuilder::new("alerting")
            .description("Process incoming alerts from a custom monitoring service")
            .webhook(
                Webhook::new("custom-alerts", "staging", WebhookProvider::GenericHmacSha256)
                    .filter("payload.status == \"firing\" && payload.severity == \"critical\"")
                    .idempotency_key("payload.alert_id + \"/\" + payload.timestamp")
                    .transform(
                        "{\"handle_alert\": {\"alert_id\": payload.alert_id, \
                         \"service\": payload.service, \"message\": payload.message}}",
                    ),
            ),
    )?;

    ctx.register(
        pipeline
            .step("handle_alert")
            .description("Process an incoming critical alert")
            .credential("pagerduty-token", "PAGERDUTY_TOKEN")
            .sandbox(SandboxDefinition {
                cpu_request: Some("250m".to_string()),
                memory_request: Some("256Mi".to_string()),
                memory_limit: Some("512Mi".to_string()),
                ..SandboxDefinition::new("python:3.12-slim")
            })
            .input::<AlertInput>("input_data")
            .handler(handle_alert),
    )?;

    Ok(())
}
