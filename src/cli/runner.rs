//! Command handlers
//!
//! Each handler writes its human-facing output to the given writer so the
//! binary can pass stdout and tests can pass a buffer.

use crate::cli::{
    commands::{ConfigCommand, GetDslCommand, RunCommand},
    output::{create_spinner, format_check_line, format_duration, style, CheckStatus, CHECK, INFO, ROCKET},
    Command,
};
use crate::core::config::{ProjectConfig, CONFIG_FILE_NAME};
use crate::core::context::{Catalog, DiscoveryContext};
use crate::discovery::{discover, load_module, ModuleCatalog};
use crate::execution::{InvocationOutcome, StepInvoker};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Problems found by `check`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Names of the steps found, in registration order
    pub steps: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs CLI commands against a module catalog and a project directory
pub struct Runner<'a> {
    modules: &'a ModuleCatalog,
    project_dir: PathBuf,
}

impl<'a> Runner<'a> {
    pub fn new(modules: &'a ModuleCatalog, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules,
            project_dir: project_dir.into(),
        }
    }

    /// Dispatch a command. `Ok(false)` means the command ran but failed.
    pub async fn execute(&self, command: &Command, out: &mut dyn Write) -> Result<bool> {
        match command {
            Command::Check(_) => Ok(self.check(out)?.is_ok()),
            Command::Config {
                command: ConfigCommand::GetDsl(cmd),
            } => {
                self.get_dsl(cmd, out)?;
                Ok(true)
            }
            Command::Run(cmd) => {
                self.run_step(cmd, out).await?;
                Ok(true)
            }
        }
    }

    fn config(&self) -> Result<Option<ProjectConfig>> {
        ProjectConfig::load_from_dir(&self.project_dir)
    }

    fn discover(&self, cli_modules: &[String]) -> Result<Catalog> {
        let config = self.config()?;
        let modules = ProjectConfig::resolve_modules(config.as_ref(), cli_modules)?;
        debug!("Discovering modules: {:?}", modules);
        let catalog = discover(self.modules, modules.as_slice())
            .with_context(|| format!("Discovery failed for modules {:?}", modules))?;
        Ok(catalog)
    }

    /// Validate the project setup, printing one line per check
    pub fn check(&self, out: &mut dyn Write) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        writeln!(out, "{} Checking project setup...\n", INFO)?;

        let config_path = self.project_dir.join(CONFIG_FILE_NAME);
        let config = if !config_path.exists() {
            report
                .errors
                .push(format!("{} not found in {}", CONFIG_FILE_NAME, self.project_dir.display()));
            writeln!(out, "{}", format_check_line(CheckStatus::Fail, &format!("{} exists", CONFIG_FILE_NAME)))?;
            None
        } else {
            writeln!(out, "{}", format_check_line(CheckStatus::Ok, &format!("{} exists", CONFIG_FILE_NAME)))?;
            match ProjectConfig::from_file(&config_path) {
                Ok(config) => {
                    writeln!(out, "{}", format_check_line(CheckStatus::Ok, &format!("{} is valid", CONFIG_FILE_NAME)))?;
                    Some(config)
                }
                Err(e) => {
                    report.errors.push(format!("{:#}", e));
                    writeln!(out, "{}", format_check_line(CheckStatus::Fail, &format!("{} is valid", CONFIG_FILE_NAME)))?;
                    None
                }
            }
        };

        if let Some(config) = config {
            if config.modules.is_empty() {
                report.errors.push(format!(
                    "`modules` is empty. List your step modules in {}, e.g. modules: [\"demos::etl\"]",
                    CONFIG_FILE_NAME
                ));
                writeln!(out, "{}", format_check_line(CheckStatus::Fail, "modules configured"))?;
            } else {
                writeln!(
                    out,
                    "{}",
                    format_check_line(CheckStatus::Ok, &format!("modules configured: {:?}", config.modules))
                )?;
                self.check_modules(&config.modules, &mut report, out)?;
            }
        }

        writeln!(out, "\n{}", "-".repeat(50))?;
        if !report.errors.is_empty() {
            writeln!(out, "\nFound {} error(s):\n", report.errors.len())?;
            for (i, error) in report.errors.iter().enumerate() {
                writeln!(out, "  {}. {}\n", i + 1, style(error).red())?;
            }
        } else if !report.warnings.is_empty() {
            writeln!(out, "\nSetup OK with {} warning(s):\n", report.warnings.len())?;
            for (i, warning) in report.warnings.iter().enumerate() {
                writeln!(out, "  {}. {}\n", i + 1, style(warning).yellow())?;
            }
        } else {
            writeln!(out, "\n{} All checks passed! The project is ready.", CHECK)?;
        }

        Ok(report)
    }

    fn check_modules(
        &self,
        modules: &[String],
        report: &mut CheckReport,
        out: &mut dyn Write,
    ) -> Result<()> {
        writeln!(out, "\nChecking module loads...")?;
        let mut ctx = DiscoveryContext::new();
        let mut all_loaded = true;
        for module in modules {
            match load_module(&mut ctx, self.modules, module) {
                Ok(()) => {
                    writeln!(out, "{}", format_check_line(CheckStatus::Ok, &format!("Can load '{}'", module)))?;
                }
                Err(e) => {
                    all_loaded = false;
                    report.errors.push(e.to_string());
                    writeln!(out, "{}", format_check_line(CheckStatus::Fail, &format!("Can load '{}'", module)))?;
                }
            }
        }

        report.steps = ctx.steps().all().map(|s| s.name.clone()).collect();
        writeln!(out)?;
        if report.steps.is_empty() {
            report
                .warnings
                .push("No steps found. Make sure your modules register steps.".to_string());
            writeln!(out, "{}", format_check_line(CheckStatus::Warn, "No steps found in the configured modules"))?;
        } else {
            writeln!(
                out,
                "{}",
                format_check_line(CheckStatus::Ok, &format!("Found {} step(s):", report.steps.len()))
            )?;
            for step in &report.steps {
                writeln!(out, "       - {}", step)?;
            }
        }

        if all_loaded {
            match ctx.finish() {
                Ok(catalog) => {
                    writeln!(
                        out,
                        "{}",
                        format_check_line(
                            CheckStatus::Ok,
                            &format!("Dependency graph is valid ({} edges)", catalog.graph().edges().len())
                        )
                    )?;
                }
                Err(e) => {
                    report.errors.push(e.to_string());
                    writeln!(out, "{}", format_check_line(CheckStatus::Fail, "Dependency graph is valid"))?;
                }
            }
        }

        Ok(())
    }

    /// Export the descriptor document, print it and write it to disk
    pub fn get_dsl(&self, cmd: &GetDslCommand, out: &mut dyn Write) -> Result<PathBuf> {
        let catalog = self.discover(&cmd.modules)?;
        let document = catalog.export().context("Failed to export descriptor document")?;
        let json = document.to_json_pretty()?;

        writeln!(out, "{}", json)?;

        let output_path = match &cmd.output_file {
            Some(path) => path.clone(),
            None => ProjectConfig::output_file_or_default(self.config()?.as_ref()),
        };
        write_file(&output_path, &json)?;
        debug!("Descriptor document written to {}", output_path.display());
        Ok(output_path)
    }

    /// Invoke one step with the given input and cached results
    pub async fn run_step(&self, cmd: &RunCommand, out: &mut dyn Write) -> Result<InvocationOutcome> {
        let results = match (&cmd.results, &cmd.results_file) {
            (_, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Results file not found: {}", path.display()))?,
            (Some(inline), None) => inline.clone(),
            (None, None) => anyhow::bail!("Either --results or --results-file must be provided"),
        };

        let catalog = self.discover(&cmd.modules)?;
        if catalog.steps().get(&cmd.step).is_err() {
            let available: Vec<&str> = catalog.steps().all().map(|s| s.name.as_str()).collect();
            writeln!(out, "Available steps: {}", available.join(", "))?;
        }

        let invoker = StepInvoker::new(Arc::new(catalog));
        writeln!(out, "{} Running step {}", ROCKET, style(&cmd.step).cyan())?;

        let spinner = create_spinner(format!("Running {}", cmd.step));
        let result = invoker.invoke_json(&cmd.step, &cmd.input, &results).await;
        spinner.finish_and_clear();

        let outcome = result.with_context(|| format!("Error executing step '{}'", cmd.step))?;
        let rendered = serde_json::to_string(&outcome.value)?;

        writeln!(
            out,
            "{} Step '{}' executed successfully in {}",
            CHECK,
            style(&outcome.step).green(),
            style(format_duration(outcome.duration())).dim()
        )?;
        writeln!(out, "Result: {}", rendered)?;

        if let Some(path) = &cmd.output_file {
            write_file(path, &rendered)?;
            writeln!(out, "Result written to {}", path.display())?;
        }

        Ok(outcome)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
