/// Missing-counter tally and end-of-run summary.
///
/// The tally is observational only: it is filled from projections after the
/// row has been built and never feeds back into row values.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Column name to number of traces in which it was missing.
#[derive(Debug, Default, Clone)]
pub struct MissingTally {
    counts: HashMap<String, u64>,
}

impl MissingTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one trace's missing columns.
    pub fn record<S: AsRef<str>>(&mut self, columns: &[S]) {
        for column in columns {
            *self.counts.entry(column.as_ref().to_string()).or_insert(0) += 1;
        }
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> u64 {
        self.counts.get(column).copied().unwrap_or(0)
    }

    /// Columns by descending miss count, ties by name.
    pub fn ranked(&self) -> Vec<MissingEntry> {
        let mut entries: Vec<MissingEntry> = self
            .counts
            .iter()
            .map(|(column, &count)| MissingEntry {
                column: column.clone(),
                count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.column.cmp(&b.column)));
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingEntry {
    pub column: String,
    pub count: u64,
}

/// Outcome of a full run, optionally written as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output_csv: String,
    pub discovered: usize,
    pub written: usize,
    pub skipped: Vec<String>,
    pub missing: Vec<MissingEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Log the ranked missing-counter summary, at most `limit` entries.
    pub fn log(&self, limit: usize) {
        tracing::info!(
            output = %self.output_csv,
            discovered = self.discovered,
            written = self.written,
            skipped = self.skipped.len(),
            "run complete"
        );
        if self.missing.is_empty() {
            return;
        }
        tracing::info!("global missing counter summary (files missing each counter):");
        for entry in self.missing.iter().take(limit) {
            tracing::info!(
                "  {}: missing in {}/{} files",
                entry.column,
                entry.count,
                self.discovered
            );
        }
    }

    /// Atomically write the summary as pretty JSON.
    ///
    /// Writes to a temporary file in the same directory, then renames, so
    /// readers never see a partial write.
    pub fn write_json(&self, path: &Path) -> Result<(), SummaryError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| SummaryError::Serialize { source: e })?;

        let dir = path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".run-summary.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| SummaryError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| SummaryError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum SummaryError {
    Serialize { source: serde_json::Error },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SummaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryError::Serialize { source } => {
                write!(f, "failed to serialize run summary: {}", source)
            }
            SummaryError::Write { path, source } => {
                write!(f, "failed to write run summary {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for SummaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SummaryError::Serialize { source } => Some(source),
            SummaryError::Write { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(column: &str, count: u64) -> MissingEntry {
        MissingEntry {
            column: column.to_string(),
            count,
        }
    }

    #[test]
    fn tally_accumulates_across_records() {
        let mut tally = MissingTally::new();
        assert_eq!(tally.get("a"), 0);
        tally.record(&["a", "b"]);
        tally.record(&["b"]);
        tally.record::<&str>(&[]);
        assert_eq!(tally.get("a"), 1);
        assert_eq!(tally.get("b"), 2);
        assert_eq!(tally.get("c"), 0);
    }

    #[test]
    fn ranked_descending_by_count() {
        let mut tally = MissingTally::new();
        tally.record(&["zeta", "alpha", "mid"]);
        tally.record(&["mid"]);
        tally.record(&["mid", "zeta"]);
        assert_eq!(
            tally.ranked(),
            vec![entry("mid", 3), entry("zeta", 2), entry("alpha", 1)]
        );
    }

    #[test]
    fn ranked_ties_sorted_by_name() {
        let mut tally = MissingTally::new();
        tally.record(&["b", "a", "c"]);
        let names: Vec<String> = tally.ranked().into_iter().map(|e| e.column).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn write_json_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let now = Utc::now();
        let summary = RunSummary {
            output_csv: "out.csv".to_string(),
            discovered: 3,
            written: 2,
            skipped: vec!["bad.darshan".to_string()],
            missing: vec![entry("POSIX_OPENS", 2)],
            started_at: now,
            finished_at: now,
        };
        summary.write_json(&path).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["discovered"], 3);
        assert_eq!(v["written"], 2);
        assert_eq!(v["skipped"][0], "bad.darshan");
        assert_eq!(v["missing"][0]["column"], "POSIX_OPENS");
        assert_eq!(v["missing"][0]["count"], 2);

        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".run-summary"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn write_json_bad_dir_is_error() {
        let summary = RunSummary {
            output_csv: String::new(),
            discovered: 0,
            written: 0,
            skipped: Vec::new(),
            missing: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let err = summary
            .write_json(Path::new("/nonexistent-dir/summary.json"))
            .unwrap_err();
        assert!(matches!(err, SummaryError::Write { .. }));
    }
}
