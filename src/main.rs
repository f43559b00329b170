mod check;
mod collectors;
mod config;
mod events;
mod output;
mod report;
mod severity;

use check::{CheckError, ReportSource};
use clap::Parser;
use config::Config;
use output::OutputFormat;
use severity::Severity;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ipmi-power-check")]
#[command(version, about = "Check IPMI power supply and power unit sensors")]
struct Cli {
    /// YAML configuration file; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Diagnostic command to run instead of the configured one
    #[arg(long)]
    command: Option<String>,
    /// Deadline for the diagnostic command, e.g. `15s` or `500ms`
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
    /// Evaluate an already captured report (`-` for stdin) instead of running the command
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let result = tokio::select! {
        result = execute(&cli) => result,
        _ = interrupted() => Err(CheckError::Interrupted),
    };

    let status = match result {
        Ok(outcome) => match output::render(&outcome, cli.format) {
            Ok(text) => {
                println!("{text}");
                outcome.status
            }
            Err(err) => {
                error!(error = %err, "failed to render check result");
                println!("{}", output::render_failure(&err, cli.format));
                Severity::Unknown
            }
        },
        Err(err) => {
            error!(error = %err, "check failed");
            println!("{}", output::render_failure(&err, cli.format));
            Severity::Unknown
        }
    };

    std::process::exit(status.exit_code());
}

async fn execute(cli: &Cli) -> Result<check::CheckOutcome, CheckError> {
    let cfg = build_config(cli)?;
    let source = ReportSource::from_arg(cli.input.clone());
    info!(
        command = %cfg.command,
        timeout_ms = cfg.timeout_ms,
        source = ?source,
        "running power check"
    );

    let outcome = check::run(&cfg, &source).await?;
    info!(status = %outcome.status, records = outcome.records.len(), "power check finished");
    Ok(outcome)
}

fn build_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    if let Some(command) = &cli.command {
        cfg.command = command.clone();
    }
    if let Some(timeout) = cli.timeout {
        cfg.timeout_ms = whole_millis(timeout);
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Rounds up so that only a zero duration becomes zero milliseconds.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
