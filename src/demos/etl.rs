//! A small extract/clean/report pipeline

use crate::core::{
    context::DiscoveryContext,
    error::Result,
    pipeline::PipelineBuilder,
    step::StepArgs,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Page {
    #[schemars(description = "Raw page text")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Cleaned {
    pub content: String,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub summary: String,
    pub removed_chars: usize,
    pub words: Vec<String>,
}

async fn fetch(_args: StepArgs) -> anyhow::Result<Page> {
    Ok(Page {
        content: "  Hello From The Bridge  ".to_string(),
    })
}

async fn clean(args: StepArgs) -> anyhow::Result<Cleaned> {
    let raw: Page = args.get("raw")?;
    let content = raw.content.trim().to_lowercase();
    Ok(Cleaned {
        length: content.chars().count(),
        content,
    })
}

async fn report(args: StepArgs) -> anyhow::Result<Report> {
    let cleaned: Cleaned = args.get("cleaned")?;
    let original: Page = args.get("original")?;
    let words: Vec<String> = cleaned
        .content
        .split_whitespace()
        .map(str::to_string)
        .collect();
    Ok(Report {
        summary: format!("{} words, {} chars", words.len(), cleaned.length),
        removed_chars: original.content.chars().count().saturating_sub(cleaned.length),
        words,
    })
}

pub fn register(ctx: &mut DiscoveryContext) -> Result<()> {
    let etl = ctx.register_pipeline(
        PipelineBuilder::new("etl").description("Fetch a page, normalize it and report on it"),
    )?;

    let fetched = ctx.register(
        etl.step("fetch")
            .description("Fetch the raw page")
            .handler(fetch),
    )?;
    let cleaned = ctx.register(
        etl.step("clean")
            .description("Trim and lowercase the page")
            .param_from("raw", fetched.result())
            .handler(clean),
    )?;
    ctx.register(
        etl.step("report")
            .description("Summarize the cleaned page")
            .param_from("cleaned", cleaned.result())
            .param_from("original", fetched.result())
            .handler(report),
    )?;

    Ok(())
}
