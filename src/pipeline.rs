//! Batch driver: discover traces, dump and extract each one, project onto the
//! schema, and append one CSV row per trace in discovery order.
//!
//! A trace whose totals dump fails is skipped; nothing about a single trace
//! stops the batch.

use crate::config::{DumperConfig, FeatureConfig, ReportConfig, ScratchConfig};
use crate::counters::{extract_counters, CounterMap};
use crate::dump::{run_dump, DumpError, DumpKind};
use crate::report::{MissingTally, RunSummary, SummaryError};
use crate::schema::{Projection, Schema, SchemaError};
use crate::stripe::{filter_records, StripeObservations};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Per-run inputs and outputs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    pub output_csv: PathBuf,
    pub schema_csv: PathBuf,
    pub summary_json: Option<PathBuf>,
}

#[derive(Debug)]
pub enum RunError {
    Schema(SchemaError),
    Discovery {
        pattern: String,
        source: glob::PatternError,
    },
    NoTraceFiles {
        input_dir: PathBuf,
    },
    Scratch {
        path: Option<PathBuf>,
        source: std::io::Error,
    },
    Output {
        path: PathBuf,
        source: csv::Error,
    },
    Summary(SummaryError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Schema(e) => write!(f, "{e}"),
            RunError::Discovery { pattern, source } => {
                write!(f, "invalid discovery pattern {pattern}: {source}")
            }
            RunError::NoTraceFiles { input_dir } => {
                write!(f, "no trace files found in {}", input_dir.display())
            }
            RunError::Scratch { path: Some(p), source } => {
                write!(f, "failed to create scratch directory {}: {}", p.display(), source)
            }
            RunError::Scratch { path: None, source } => {
                write!(f, "failed to create temporary scratch directory: {source}")
            }
            RunError::Output { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            RunError::Summary(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Schema(e) => Some(e),
            RunError::Discovery { source, .. } => Some(source),
            RunError::NoTraceFiles { .. } => None,
            RunError::Scratch { source, .. } => Some(source),
            RunError::Output { source, .. } => Some(source),
            RunError::Summary(e) => Some(e),
        }
    }
}

/// Why a single trace produced no row.
#[derive(Debug)]
pub enum ExtractError {
    /// The totals dump exited non-zero (None if killed by signal).
    TotalsFailed { exit_code: Option<i32> },
    /// The totals dump could not be run or read back.
    Dump(DumpError),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::TotalsFailed {
                exit_code: Some(code),
            } => write!(f, "totals dump exited with status {code}"),
            ExtractError::TotalsFailed { exit_code: None } => {
                write!(f, "totals dump terminated by signal")
            }
            ExtractError::Dump(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::TotalsFailed { .. } => None,
            ExtractError::Dump(e) => Some(e),
        }
    }
}

/// Scratch space for captured dump output, removed when dropped.
pub enum ScratchDir {
    Temp(tempfile::TempDir),
    Explicit(PathBuf),
}

impl ScratchDir {
    pub fn create(config: &ScratchConfig) -> Result<Self, RunError> {
        match &config.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| RunError::Scratch {
                    path: Some(dir.clone()),
                    source: e,
                })?;
                Ok(ScratchDir::Explicit(dir.clone()))
            }
            None => tempfile::Builder::new()
                .prefix("darshan_parse_")
                .tempdir()
                .map(ScratchDir::Temp)
                .map_err(|e| RunError::Scratch {
                    path: None,
                    source: e,
                }),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ScratchDir::Temp(t) => t.path(),
            ScratchDir::Explicit(p) => p,
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let ScratchDir::Explicit(dir) = self {
            if let Err(e) = std::fs::remove_dir_all(dir.as_path()) {
                tracing::warn!(error = %e, dir = %dir.display(), "failed to remove scratch directory");
            }
        }
    }
}

/// Find every `*.<extension>` file under `input_dir`, sorted by path.
pub fn discover_traces(input_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, RunError> {
    let base = glob::Pattern::escape(&input_dir.to_string_lossy());
    let pattern = format!("{base}/**/*.{extension}");
    let entries = glob::glob(&pattern).map_err(|e| RunError::Discovery {
        pattern: pattern.clone(),
        source: e,
    })?;

    let mut traces: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable path during discovery");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    traces.sort();
    Ok(traces)
}

/// Lines of a non-essential report; failures degrade to an empty report.
async fn optional_report(
    config: &DumperConfig,
    kind: DumpKind,
    trace: &Path,
    scratch: &Path,
) -> Vec<String> {
    let result = match run_dump(config, kind, trace, scratch).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, %kind, "dump failed, continuing without it");
            return Vec::new();
        }
    };
    if !result.succeeded() {
        tracing::warn!(exit_code = ?result.exit_code, kind = %result.kind, "dump exited non-zero, using partial output");
    }
    result.lines().unwrap_or_else(|e| {
        tracing::warn!(error = %e, kind = %result.kind, "failed to read dump output");
        Vec::new()
    })
}

/// Run the three dumps for `trace` and combine them into one counter map.
///
/// Only a failed totals dump is fatal for the trace.
pub async fn extract_trace(
    config: &DumperConfig,
    trace: &Path,
    scratch: &Path,
) -> Result<CounterMap, ExtractError> {
    let totals = run_dump(config, DumpKind::Totals, trace, scratch)
        .await
        .map_err(ExtractError::Dump)?;
    if !totals.succeeded() {
        return Err(ExtractError::TotalsFailed {
            exit_code: totals.exit_code,
        });
    }
    let totals_lines = totals.lines().map_err(ExtractError::Dump)?;

    let perf_lines = optional_report(config, DumpKind::Perf, trace, scratch).await;
    let record_lines = optional_report(config, DumpKind::Records, trace, scratch).await;

    let mut counters = extract_counters(&totals_lines, &perf_lines);
    StripeObservations::from_rows(&filter_records(&record_lines)).apply(&mut counters);
    Ok(counters)
}

/// Decimal rendering of an output value. Integral values keep a `.0`.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

fn log_projection(projection: &Projection, report: &ReportConfig) {
    let labels = projection.missing_labels();
    if report.log_missing && !labels.is_empty() {
        tracing::info!("  missing {} counters (set to 0):", labels.len());
        for label in labels.iter().take(report.missing_detail_limit) {
            tracing::info!("    - {label}");
        }
        if labels.len() > report.missing_detail_limit {
            tracing::info!("    ... and {} more", labels.len() - report.missing_detail_limit);
        }
    }
    tracing::info!("  found {} counters", projection.found);
}

/// Process every discovered trace and write the feature CSV.
pub async fn run(config: &FeatureConfig, opts: &RunOptions) -> Result<RunSummary, RunError> {
    let started_at = Utc::now();
    let schema = Schema::from_csv(&opts.schema_csv).map_err(RunError::Schema)?;

    let traces = discover_traces(&opts.input_dir, &config.discovery.extension)?;
    if traces.is_empty() {
        return Err(RunError::NoTraceFiles {
            input_dir: opts.input_dir.clone(),
        });
    }
    tracing::info!(count = traces.len(), columns = schema.len(), "found trace files to process");

    let scratch = ScratchDir::create(&config.scratch)?;
    let output_err = |e: csv::Error| RunError::Output {
        path: opts.output_csv.clone(),
        source: e,
    };
    let mut writer = csv::Writer::from_path(&opts.output_csv).map_err(output_err)?;
    writer.write_record(schema.columns()).map_err(output_err)?;

    let mut tally = MissingTally::new();
    let mut written = 0usize;
    let mut skipped = Vec::new();

    for (idx, trace) in traces.iter().enumerate() {
        let name = trace
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| trace.display().to_string());
        tracing::info!("processing {}/{}: {}", idx + 1, traces.len(), name);

        let counters = match extract_trace(&config.dumper, trace, scratch.path()).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, trace = %trace.display(), "skipping trace");
                skipped.push(trace.display().to_string());
                continue;
            }
        };

        let projection = schema.project(&counters);
        writer
            .write_record(projection.row.iter().map(|v| format_value(*v)))
            .map_err(output_err)?;
        tally.record(&projection.missing);
        written += 1;

        log_projection(&projection, &config.report);
    }

    writer
        .flush()
        .map_err(|e| output_err(csv::Error::from(e)))?;
    drop(scratch);

    let summary = RunSummary {
        output_csv: opts.output_csv.display().to_string(),
        discovered: traces.len(),
        written,
        skipped,
        missing: tally.ranked(),
        started_at,
        finished_at: Utc::now(),
    };
    summary.log(config.report.summary_limit);

    if let Some(path) = &opts.summary_json {
        summary.write_json(path).map_err(RunError::Summary)?;
    }

    Ok(summary)
}
