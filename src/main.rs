mod config;
mod counters;
mod dump;
mod normalize;
mod pipeline;
mod report;
mod schema;
mod stripe;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Convert Darshan I/O trace logs into a fixed-schema feature CSV:
/// dump each trace, extract its counters, log-normalize them onto the
/// columns of a sample CSV, and report which counters were missing.
#[derive(Parser, Debug)]
#[command(name = "darshan-features", version, about)]
pub struct Cli {
    /// Directory searched recursively for trace files
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    /// Feature CSV to write
    #[arg(value_name = "OUTPUT_CSV")]
    output_csv: PathBuf,

    /// CSV whose header row defines the output columns
    #[arg(value_name = "SCHEMA_CSV")]
    schema_csv: PathBuf,

    /// Scratch directory for dump output (default: a temporary directory)
    #[arg(value_name = "SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "darshan-features.toml")]
    config: PathBuf,

    /// Trace dump command (overrides config)
    #[arg(long)]
    dumper: Option<String>,

    /// Trace file extension (overrides config)
    #[arg(long)]
    extension: Option<String>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Resolve config and discover traces, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (raw counter lines, stripe observations)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings, errors and nothing else
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(command) = &cli.dumper {
        config.dumper.command = command.clone();
    }
    if let Some(extension) = &cli.extension {
        config.discovery.extension = extension.trim_start_matches('.').to_string();
    }
    if let Some(dir) = &cli.scratch_dir {
        config.scratch.dir = Some(dir.clone());
    }

    if cli.dry_run {
        match toml::to_string_pretty(&config) {
            Ok(s) => println!("{s}"),
            Err(e) => tracing::warn!(error = %e, "failed to render resolved config"),
        }
        return match pipeline::discover_traces(&cli.input_dir, &config.discovery.extension) {
            Ok(traces) => {
                println!("{} trace files found in {}", traces.len(), cli.input_dir.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let opts = pipeline::RunOptions {
        input_dir: cli.input_dir,
        output_csv: cli.output_csv,
        schema_csv: cli.schema_csv,
        summary_json: cli.summary_json,
    };

    match pipeline::run(&config, &opts).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
