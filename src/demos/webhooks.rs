//! Issue triage pipeline triggered by Linear and GitHub webhooks

use crate::core::{
    context::DiscoveryContext,
    error::Result,
    pipeline::{PipelineBuilder, Webhook, WebhookProvider},
    step::StepArgs,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchIssueInput {
    pub issue_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IssueDetails {
    pub issue_id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriageResult {
    pub issue_id: String,
    pub priority: Priority,
    pub labels: Option<Vec<String>>,
}

async fn fetch_issue(args: StepArgs) -> anyhow::Result<IssueDetails> {
    let input: FetchIssueInput = args.get("input_data")?;
    Ok(IssueDetails {
        issue_id: input.issue_id,
        title: input.title,
        description: "(fetched from API)".to_string(),
    })
}

async fn triage_issue(args: StepArgs) -> anyhow::Result<TriageResult> {
    let issue: IssueDetails = args.get("issue")?;
    let title = issue.title.to_lowercase();
    let priority = if title.contains("outage") || title.contains("data loss") {
        Priority::Critical
    } else if title.contains("crash") || title.contains("security") {
        Priority::High
    } else if title.contains("typo") || title.contains("docs") {
        Priority::Low
    } else {
        Priority::Medium
    };
    let labels = title.contains("autofix").then(|| vec!["autofix".to_string()]);

    Ok(TriageResult {
        issue_id: issue.issue_id,
        priority,
        labels,
    })
}

pub fn register(ctx: &mut DiscoveryContext) -> Result<()> {
    let pipeline = ctx.register_pipeline(
        PipelineBuilder::new("issue_triage")
            .description("Triage incoming issues from Linear and GitHub")
            .webhook(
                Webhook::new("linear-autofix", "main", WebhookProvider::Linear)
                    .filter(
                        "payload.type == \"Issue\" && payload.action == \"create\" \
                         && payload.data.labels.exists(l, l.name == \"autofix\")",
                    )
                    .transform(
                        "{\"fetch_issue\": {\"issue_id\": payload.data.id, \"title\": payload.data.title}}",
                    ),
            )
            .webhook(
                Webhook::new("github-pr-opened", "production", WebhookProvider::Github)
                    .filter(
                        "headers[\"x-github-event\"] == \"pull_request\" \
                         && payload.action == \"opened\" \
                         && payload.pull_request.base.ref == \"main\"",
                    )
                    .transform(
                        "{\"fetch_issue\": {\"issue_id\": payload.pull_request.head.sha, \
                         \"title\": payload.pull_request.title}}",
                    ),
            ),
    )?;

    let fetched = ctx.register(
        pipeline
            .step("fetch_issue")
            .description("Fetch full issue details from the source system")
            .input::<FetchIssueInput>("input_data")
            .handler(fetch_issue),
    )?;
    ctx.register(
        pipeline
            .step("triage_issue")
            .description("Assign a priority to the issue")
            .metadata("type", "agent")
            .param_from("issue", fetched.result())
            .handler(triage_issue),
    )?;

    Ok(())
}
