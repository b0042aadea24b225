//! Test: declare, discover, export and invoke steps end to end

use crate::helpers::*;
use bridge_steps::core::context::DiscoveryContext;
use bridge_steps::{export, Dependency, PipelineBuilder, StepArgs, StepBuilder, StepInvoker};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

async fn one(_args: StepArgs) -> anyhow::Result<i64> {
    Ok(1)
}

async fn two(_args: StepArgs) -> anyhow::Result<i64> {
    Ok(2)
}

async fn sum(args: StepArgs) -> anyhow::Result<i64> {
    let left: i64 = args.get("left")?;
    let right: i64 = args.get("right")?;
    Ok(left + right)
}

async fn double(args: StepArgs) -> anyhow::Result<i64> {
    let value: i64 = args.get("value")?;
    Ok(value * 2)
}

/// Steps `a` and `b` feed `c`
fn diamond_top(ctx: &mut DiscoveryContext) -> bridge_steps::core::error::Result<()> {
    let a = ctx.register(StepBuilder::new("a").handler(one))?;
    let b = ctx.register(StepBuilder::new("b").handler(two))?;
    ctx.register(
        StepBuilder::new("c")
            .param_from("left", a.result())
            .param_from("right", b.result())
            .handler(sum),
    )?;
    Ok(())
}

#[tokio::test]
async fn test_clean_step_reads_cached_fetch_result() {
    let invoker = demo_invoker(&["demos::etl"]);

    let upstream = HashMap::from([("fetch".to_string(), json!({ "content": "  HELLO  " }))]);
    let outcome = invoker.invoke("clean", &json!({}), &upstream).await.unwrap();

    assert_eq!(outcome.step, "clean");
    assert_eq!(outcome.value, json!({ "content": "hello", "length": 5 }));
    assert!(outcome.completed_at >= outcome.started_at);
}

#[tokio::test]
async fn test_report_consumes_two_markers() {
    let invoker = demo_invoker(&["demos::etl"]);

    let outcome = invoker
        .invoke_json(
            "report",
            "{}",
            r#"{
                "fetch": {"content": "  Hello Bridge  "},
                "clean": {"content": "hello bridge", "length": 12}
            }"#,
        )
        .await
        .unwrap();

    assert_eq!(outcome.value["words"], json!(["hello", "bridge"]));
    assert_eq!(outcome.value["removed_chars"], json!(4));
}

#[tokio::test]
async fn test_negative_length_for_unsigned_field_is_rejected_before_running() {
    let invoker = demo_invoker(&["demos::etl"]);

    let err = invoker
        .invoke_json(
            "report",
            "{}",
            r#"{
                "fetch": {"content": "a b"},
                "clean": {"content": "a b", "length": -3}
            }"#,
        )
        .await
        .unwrap_err();

    assert_kind(&err, "input_validation_error");
    match err {
        bridge_steps::BridgeError::InputValidationError { step, param, mismatch } => {
            assert_eq!(step, "report");
            assert_eq!(param, "cleaned");
            assert_eq!(mismatch.path, "$.length");
            assert_eq!(mismatch.actual, "integer -3");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_missing_upstream_names_the_absent_step() {
    let catalog = finish_with(diamond_top).unwrap();
    let invoker = StepInvoker::new(Arc::new(catalog));

    let upstream = HashMap::from([("a".to_string(), json!(1))]);
    let err = invoker.invoke("c", &Value::Null, &upstream).await.unwrap_err();

    assert_kind(&err, "missing_upstream_result");
    match err {
        bridge_steps::BridgeError::MissingUpstreamResult { step, param, upstream } => {
            assert_eq!(step, "c");
            assert_eq!(param, "right");
            assert_eq!(upstream, "b");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_upstream_with_both_results_runs() {
    let catalog = finish_with(diamond_top).unwrap();
    let invoker = StepInvoker::new(Arc::new(catalog));

    let outcome = invoker
        .invoke_json("c", "null", r#"{"a": 40, "b": 2}"#)
        .await
        .unwrap();
    assert_eq!(outcome.value, json!(42));
}

#[tokio::test]
async fn test_raw_input_key_overrides_cached_result() {
    let catalog = finish_with(diamond_top).unwrap();
    let invoker = StepInvoker::new(Arc::new(catalog));

    let outcome = invoker
        .invoke_json("c", r#"{"right": 10}"#, r#"{"a": 1, "b": 2}"#)
        .await
        .unwrap();
    assert_eq!(outcome.value, json!(11));

    // The override also stands in for an absent result
    let outcome = invoker
        .invoke_json("c", r#"{"right": 5}"#, r#"{"a": 1}"#)
        .await
        .unwrap();
    assert_eq!(outcome.value, json!(6));
}

#[tokio::test]
async fn test_wrongly_shaped_cached_result_is_rejected() {
    let catalog = finish_with(diamond_top).unwrap();
    let invoker = StepInvoker::new(Arc::new(catalog));

    let err = invoker
        .invoke_json("c", "null", r#"{"a": "one", "b": 2}"#)
        .await
        .unwrap_err();
    assert_kind(&err, "input_validation_error");
}

#[test]
fn test_dangling_marker_fails_export() {
    let mut ctx = DiscoveryContext::new();
    let p = ctx.register_pipeline(PipelineBuilder::new("p")).unwrap();
    let first = ctx.register(p.step("first").handler(one)).unwrap();
    ctx.register(p.step("second").param_from("value", first.result()).handler(double))
        .unwrap();
    ctx.register(
        p.step("third")
            .param_from("value", Dependency::<i64>::on("ghost"))
            .handler(double),
    )
    .unwrap();

    let err = export(ctx.steps(), ctx.pipelines()).unwrap_err();
    assert_kind(&err, "unknown_dependency");
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_two_step_cycle_is_reported_with_its_path() {
    let err = finish_with(|ctx| {
        ctx.register(
            StepBuilder::new("a")
                .param_from("value", Dependency::<i64>::on("b"))
                .handler(double),
        )?;
        ctx.register(
            StepBuilder::new("b")
                .param_from("value", Dependency::<i64>::on("a"))
                .handler(double),
        )?;
        Ok(())
    })
    .unwrap_err();

    match err {
        bridge_steps::BridgeError::CyclicDependency { cycle } => {
            assert_eq!(cycle.len(), 3);
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"a".to_string()));
            assert!(cycle.contains(&"b".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_one_edge_per_marker() {
    let catalog = finish_with(|ctx| {
        let a = ctx.register(StepBuilder::new("a").handler(one))?;
        ctx.register(
            StepBuilder::new("c")
                .param_from("left", a.result())
                .param_from("right", a.result())
                .handler(sum),
        )?;
        Ok(())
    })
    .unwrap();

    assert_eq!(catalog.graph().edges().len(), 2);
    assert_eq!(catalog.graph().upstream_of("c"), &["a".to_string()]);
    assert_eq!(catalog.step("c").unwrap().depends_on(), vec!["a".to_string()]);
}

#[test]
fn test_export_is_deterministic() {
    let catalog = demo_catalog(&["demos::etl", "demos::webhooks"]);

    let first = catalog.export().unwrap().to_json_pretty().unwrap();
    let second = catalog.export().unwrap().to_json_pretty().unwrap();
    assert_eq!(first, second);

    let rediscovered = demo_catalog(&["demos::etl", "demos::webhooks"]);
    let document = rediscovered.export().unwrap();
    assert_eq!(document, catalog.export().unwrap());

    let clean = &document.steps["clean"];
    assert_eq!(clean.params_json_schema["title"], json!("clean_args"));
    assert_eq!(clean.params_json_schema["required"], json!(["raw"]));
    assert_eq!(clean.depends_on, vec!["fetch".to_string()]);

    let etl = &document.pipelines["etl"];
    assert_eq!(etl.root_steps, vec!["fetch".to_string()]);
    assert_eq!(etl.leaf_steps, vec!["report".to_string()]);
}
