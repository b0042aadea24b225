//! Test: CLI commands against a temporary project directory

use crate::helpers::*;
use bridge_steps::cli::commands::{GetDslCommand, RunCommand};
use bridge_steps::cli::runner::Runner;
use bridge_steps::cli::Cli;
use bridge_steps::{demos, BridgeError};
use serde_json::{json, Value};

fn render(buffer: Vec<u8>) -> String {
    console::strip_ansi_codes(&String::from_utf8(buffer).unwrap()).into_owned()
}

#[test]
fn test_check_passes_for_configured_project() {
    let dir = project_with_config("modules:\n  - demos::etl\n");
    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());

    let mut out = Vec::new();
    let report = runner.check(&mut out).unwrap();
    let output = render(out);

    assert!(report.is_ok(), "errors: {:?}", report.errors);
    assert_eq!(report.steps, vec!["fetch", "clean", "report"]);
    assert!(output.contains("[OK]   bridge.yaml exists"));
    assert!(output.contains("[OK]   Can load 'demos::etl'"));
    assert!(output.contains("Dependency graph is valid (3 edges)"));
    assert!(output.contains("All checks passed"));
}

#[test]
fn test_check_fails_without_config() {
    let dir = temp_project();
    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());

    let mut out = Vec::new();
    let report = runner.check(&mut out).unwrap();
    let output = render(out);

    assert!(!report.is_ok());
    assert!(output.contains("[FAIL] bridge.yaml exists"));
    assert!(output.contains("Found 1 error(s)"));
}

#[test]
fn test_check_reports_unknown_module() {
    let dir = project_with_config("modules: [\"demos::etl\", \"demos::missing\"]\n");
    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());

    let mut out = Vec::new();
    let report = runner.check(&mut out).unwrap();
    let output = render(out);

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("demos::missing"));
    assert!(output.contains("[FAIL] Can load 'demos::missing'"));
}

#[test]
fn test_get_dsl_writes_configured_output_file() {
    let dir = temp_project();
    let output_file = dir.join("build").join("dsl.json");
    std::fs::write(
        dir.join("bridge.yaml"),
        format!(
            "modules: [\"demos::webhooks\"]\noutput_file: \"{}\"\n",
            output_file.display()
        ),
    )
    .unwrap();

    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());
    let mut out = Vec::new();
    let written = runner.get_dsl(&GetDslCommand::default(), &mut out).unwrap();

    assert_eq!(written, output_file);
    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
    let printed: Value = serde_json::from_str(&String::from_utf8(out).unwrap()).unwrap();
    assert_eq!(on_disk, printed);
    assert_eq!(on_disk["pipelines"]["issue_triage"]["root_steps"], json!(["fetch_issue"]));
    assert_eq!(on_disk["steps"]["triage_issue"]["depends_on"], json!(["fetch_issue"]));
}

#[test]
fn test_get_dsl_cli_modules_override_config() {
    let dir = project_with_config("modules: [\"demos::webhooks\"]\n");
    let output_file = dir.join("override.json");
    let cmd = GetDslCommand {
        modules: vec!["demos::etl".to_string()],
        output_file: Some(output_file.clone()),
    };

    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());
    runner.get_dsl(&cmd, &mut Vec::new()).unwrap();

    let document: Value = serde_json::from_str(&std::fs::read_to_string(&output_file).unwrap()).unwrap();
    assert!(document["pipelines"].get("etl").is_some());
    assert!(document["pipelines"].get("issue_triage").is_none());
}

#[test]
fn test_get_dsl_without_modules_fails() {
    let dir = temp_project();
    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());

    let err = runner.get_dsl(&GetDslCommand::default(), &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("No modules specified"));
}

#[tokio::test]
async fn test_run_step_with_inline_results() {
    let dir = project_with_config("modules: [\"demos::etl\"]\n");
    let output_file = dir.join("result.json");
    let cmd = RunCommand {
        results: Some(r#"{"fetch": {"content": "  HELLO  "}}"#.to_string()),
        output_file: Some(output_file.clone()),
        ..RunCommand::new("clean", "{}")
    };

    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());
    let mut out = Vec::new();
    let outcome = runner.run_step(&cmd, &mut out).await.unwrap();
    let output = render(out);

    assert_eq!(outcome.value, json!({ "content": "hello", "length": 5 }));
    assert!(output.contains("Step 'clean' executed successfully"));
    assert!(output.contains(r#"Result: {"content":"hello","length":5}"#));
    assert_eq!(
        std::fs::read_to_string(&output_file).unwrap(),
        r#"{"content":"hello","length":5}"#
    );
}

#[tokio::test]
async fn test_run_step_with_results_file() {
    let dir = temp_project();
    let results_file = dir.join("results.json");
    std::fs::write(&results_file, r#"{"fetch_issue": {"issue_id": "BR-7", "title": "Crash on start", "description": ""}}"#)
        .unwrap();

    let cmd = RunCommand {
        results_file: Some(results_file),
        modules: vec!["demos::webhooks".to_string()],
        ..RunCommand::new("triage_issue", "{}")
    };

    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());
    let outcome = runner.run_step(&cmd, &mut Vec::new()).await.unwrap();

    assert_eq!(outcome.value["issue_id"], json!("BR-7"));
}

#[tokio::test]
async fn test_run_unknown_step_lists_available_steps() {
    let dir = project_with_config("modules: [\"demos::etl\"]\n");
    let cmd = RunCommand {
        results: Some("{}".to_string()),
        ..RunCommand::new("nope", "{}")
    };

    let modules = demos::catalog();
    let runner = Runner::new(&modules, dir.path());
    let mut out = Vec::new();
    let err = runner.run_step(&cmd, &mut out).await.unwrap_err();

    assert!(render(out).contains("Available steps: fetch, clean, report"));
    let typed = err.chain().find_map(|e| e.downcast_ref::<BridgeError>()).unwrap();
    assert_kind(typed, "step_not_found");
}

#[tokio::test]
async fn test_parsed_check_command_executes() {
    let dir = project_with_config("modules: [\"demos::alerting\"]\n");
    let cli = Cli::try_parse_from(["bridge", "-C", dir.to_str().unwrap(), "check"]).unwrap();

    let modules = demos::catalog();
    let runner = Runner::new(&modules, cli.project_dir.clone().unwrap());
    let passed = runner.execute(&cli.command, &mut Vec::new()).await.unwrap();
    assert!(passed);
}

#[test]
fn test_project_dir_is_removed_when_a_test_panics() {
    let mut seen = std::path::PathBuf::new();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let dir = project_with_config("modules: [\"demos::etl\"]\n");
        seen = dir.to_path_buf();
        assert!(seen.join("bridge.yaml").exists());
        panic!("assertion failed mid-test");
    }));

    assert!(outcome.is_err());
    assert!(!seen.as_os_str().is_empty());
    assert!(!seen.exists());
}
