//! CLI output formatting

use crate::core::error::BridgeError;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Outcome of one `check` item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Fail,
    Warn,
}

/// Format one `check` line, tag padded so messages line up
pub fn format_check_line(status: CheckStatus, message: &str) -> String {
    let tag = match status {
        CheckStatus::Ok => style("[OK]  ").green(),
        CheckStatus::Fail => style("[FAIL]").red(),
        CheckStatus::Warn => style("[WARN]").yellow(),
    };
    format!("{} {}", tag, message)
}

/// Create a spinner shown while a step runs
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Render an error for the terminal.
///
/// Typed failures get an `error[<kind>]` prefix; the context chain follows.
pub fn format_error(error: &anyhow::Error) -> String {
    let kind = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<BridgeError>())
        .map(BridgeError::kind);

    match kind {
        Some(kind) => format!("{}{}: {:#}", CROSS, style(format!("error[{}]", kind)).red().bold(), error),
        None => format!("{}{}: {:#}", CROSS, style("error").red().bold(), error),
    }
}

/// Human-readable duration
pub fn format_duration(duration: chrono::Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else {
        let secs = millis / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
