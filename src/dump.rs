/// Trace dump invocation: run the external dump utility against one trace,
/// capture stdout to a scratch file, report the exit code.
use crate::config::DumperConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// The three reports produced for every trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    /// Aggregate totals (`--total`).
    Totals,
    /// Performance estimates per module (`--perf`).
    Perf,
    /// Full record dump, later filtered to storage-layout rows.
    Records,
}

impl DumpKind {
    /// Scratch file name the report is captured into.
    pub fn file_name(self) -> &'static str {
        match self {
            DumpKind::Totals => "parsed_total.txt",
            DumpKind::Perf => "parsed_perf.txt",
            DumpKind::Records => "parsed_records.txt",
        }
    }

    fn args(self, config: &DumperConfig) -> &[String] {
        match self {
            DumpKind::Totals => &config.total_args,
            DumpKind::Perf => &config.perf_args,
            DumpKind::Records => &config.records_args,
        }
    }
}

impl std::fmt::Display for DumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DumpKind::Totals => "totals",
            DumpKind::Perf => "perf",
            DumpKind::Records => "records",
        };
        f.write_str(s)
    }
}

/// Result of one completed dump invocation.
#[derive(Debug)]
pub struct DumpResult {
    pub kind: DumpKind,
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    /// File holding the captured stdout.
    pub output_file: PathBuf,
}

impl DumpResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Read the captured report as lines. Invalid UTF-8 is replaced rather
    /// than rejected.
    pub fn lines(&self) -> Result<Vec<String>, DumpError> {
        let bytes = std::fs::read(&self.output_file).map_err(|e| DumpError::Read {
            path: self.output_file.clone(),
            source: e,
        })?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Errors that can occur while producing a dump.
#[derive(Debug)]
pub enum DumpError {
    /// Failed to create the scratch output file.
    OutputFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to spawn the dump utility.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// Failed while waiting on the child.
    Io { source: std::io::Error },
    /// Failed to read the captured output back.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for DumpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpError::OutputFile { path, source } => {
                write!(
                    f,
                    "failed to create dump output file {}: {}",
                    path.display(),
                    source
                )
            }
            DumpError::Spawn { command, source } => {
                write!(f, "failed to spawn {}: {}", command, source)
            }
            DumpError::Io { source } => write!(f, "I/O error during dump: {}", source),
            DumpError::Read { path, source } => {
                write!(f, "failed to read dump output {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DumpError::OutputFile { source, .. } => Some(source),
            DumpError::Spawn { source, .. } => Some(source),
            DumpError::Io { source } => Some(source),
            DumpError::Read { source, .. } => Some(source),
        }
    }
}

/// Build the argument list, replacing `{trace}` placeholders with the trace path.
fn build_args(args: &[String], trace: &Path) -> Vec<String> {
    let trace = trace.to_string_lossy();
    args.iter().map(|arg| arg.replace("{trace}", &trace)).collect()
}

/// Run the dump utility for `kind` against `trace`, writing stdout to
/// `scratch_dir/<kind file>`. Stderr is discarded.
///
/// A non-zero exit is reported through `DumpResult::exit_code`, not as an error;
/// the caller decides whether it is fatal for the trace.
pub async fn run_dump(
    config: &DumperConfig,
    kind: DumpKind,
    trace: &Path,
    scratch_dir: &Path,
) -> Result<DumpResult, DumpError> {
    let output_path = scratch_dir.join(kind.file_name());
    let output_file = std::fs::File::create(&output_path).map_err(|e| DumpError::OutputFile {
        path: output_path.clone(),
        source: e,
    })?;

    let args = build_args(kind.args(config), trace);
    tracing::debug!(
        command = %config.command,
        args = ?args,
        %kind,
        output = %output_path.display(),
        "running trace dump"
    );

    let status = Command::new(&config.command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(output_file))
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                DumpError::Spawn {
                    command: config.command.clone(),
                    source: e,
                }
            }
            _ => DumpError::Io { source: e },
        })?;

    let exit_code = status.code();
    tracing::debug!(exit_code = ?exit_code, %kind, "trace dump completed");

    Ok(DumpResult {
        kind,
        exit_code,
        output_file: output_path,
    })
}
