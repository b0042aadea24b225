//! Standalone steps chained through their results
//!
//! `step_1 -> step_2_override -> {step_3, step_4}`. None of them belongs to a
//! pipeline.

use crate::core::{
    context::DiscoveryContext,
    error::Result,
    step::{StepArgs, StepBuilder},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepInput {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepOutput {
    pub result: String,
}

async fn step_1(args: StepArgs) -> anyhow::Result<StepOutput> {
    let input: StepInput = args.get("input_data")?;
    info!("step_1 received: {}", input.value);
    Ok(StepOutput {
        result: "transformed".to_string(),
    })
}

async fn step_2(args: StepArgs) -> anyhow::Result<StepOutput> {
    let input: StepInput = args.get("input_data")?;
    let previous: StepOutput = args.get("step_1_result")?;
    info!("step_1 produced: {}", previous.result);
    Ok(StepOutput {
        result: input.value,
    })
}

async fn echo_after_step_2(args: StepArgs) -> anyhow::Result<StepOutput> {
    let input: StepInput = args.get("input_data")?;
    let previous: StepOutput = args.get("step_2_result")?;
    info!("step_2_override produced: {}", previous.result);
    Ok(StepOutput {
        result: input.value,
    })
}

pub fn register(ctx: &mut DiscoveryContext) -> Result<()> {
    let first = ctx.register(
        StepBuilder::new("step_1")
            .setup_script("scripts/setup_test.sh")
            .post_execution_script("scripts/post_execution_test.sh")
            .metadata("type", "agent")
            .input::<StepInput>("input_data")
            .handler(step_1),
    )?;

    // Registered under an explicit name; dependants follow the handle
    let second = ctx.register(
        StepBuilder::new("step_2_override")
            .setup_script("scripts/setup_test.sh")
            .post_execution_script("scripts/post_execution_test.sh")
            .metadata("type", "agent")
            .input::<StepInput>("input_data")
            .param_from("step_1_result", first.result())
            .handler(step_2),
    )?;

    ctx.register(
        StepBuilder::new("step_3")
            .setup_script("scripts/setup_test.sh")
            .post_execution_script("scripts/post_execution_test.sh")
            .input::<StepInput>("input_data")
            .param_from("step_2_result", second.result())
            .handler(echo_after_step_2),
    )?;

    ctx.register(
        StepBuilder::new("step_4")
            .setup_script("clone_repo.sh")
            .post_execution_script("push_to_git.sh")
            .metadata("type", "agent")
            .input::<StepInput>("input_data")
            .param_from("step_2_result", second.result())
            .handler(echo_after_step_2),
    )?;

    Ok(())
}
