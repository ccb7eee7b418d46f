use anyhow::Result;
use clap::{Args, Parser};
use cleanback::config::{self, AppConfig};
use cleanback::core::{Orchestrator, Selection};
use cleanback::logging::{self, LogConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code for configuration errors, matching clap's usage errors
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "cleanback")]
#[command(
    about = "Validate backup snapshots with dirval and delete the ones that fail",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    options: RunArgs,

    /// TOML config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SelectionArgs {
    /// Validate a single backup job (may be a nested path such as `site/ID1`)
    #[arg(long)]
    id: Option<String>,

    /// Validate every backup job under the backups root
    #[arg(long)]
    all: bool,
}

#[derive(Args, Serialize)]
struct RunArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    backups_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    dirval_cmd: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    workers: Option<usize>,

    /// Per-snapshot validator timeout in seconds (fractions allowed)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    timeout: Option<f64>,

    /// Always keep the N newest snapshots of each group
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    force_keep: Option<usize>,

    /// Snapshot group folder to scan below each job (repeatable)
    #[serde(rename = "snapshot_groups", skip_serializing_if = "Vec::is_empty")]
    #[arg(long = "snapshot-group")]
    snapshot_group: Vec<String>,

    /// Delete failing snapshots without asking
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, short = 'y')]
    yes: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Emit logs as JSON on stderr
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, selection) = match load(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    logging::init(LogConfig {
        json: config.log_json,
        verbose: config.verbose,
    });

    match run(config, selection).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load(cli: &Cli) -> Result<(AppConfig, Selection), config::ConfigError> {
    let selection = config::parse_selection(cli.selection.id.as_deref(), cli.selection.all)?;
    let config = AppConfig::new(&cli.config, Some(&cli.options))?;
    Ok((config, selection))
}

async fn run(config: AppConfig, selection: Selection) -> Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    Orchestrator::new(config, selection)
        .run(&mut input, &mut out)
        .await?;

    Ok(())
}
