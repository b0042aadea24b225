use anyhow::{Context, Result};
use bridge_steps::cli::output::format_error;
use bridge_steps::cli::runner::Runner;
use bridge_steps::cli::Cli;
use bridge_steps::demos;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read the working directory")?,
    };

    let modules = demos::catalog();
    let runner = Runner::new(&modules, project_dir);
    let mut stdout = std::io::stdout();

    match runner.execute(&cli.command, &mut stdout).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", format_error(&e));
            std::process::exit(1);
        }
    }
}
