//! Output schema and row projection.
//!
//! The schema is the header row of an existing feature CSV. Every trace is
//! projected onto exactly those columns, in that order.

use crate::counters::{CounterMap, POSIX_PERF_MIBS};
use crate::normalize::normalize_value;
use std::path::{Path, PathBuf};

/// Column sourced from `POSIX_PERF_MIBS` instead of a same-named counter.
pub const TAG_COLUMN: &str = "tag";

const TOTAL_VARIANT_PREFIX: &str = "total_";

/// Ordered list of output column names, fixed for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Read the header row of the CSV at `path`.
    pub fn from_csv(path: &Path) -> Result<Self, SchemaError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| SchemaError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
        let headers = rdr.headers().map_err(|e| SchemaError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        let columns: Vec<String> = headers.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(SchemaError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(Self::new(columns))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Project one trace's counters onto this schema.
    ///
    /// Per column, first match wins:
    /// 1. `tag` takes `POSIX_PERF_MIBS` (or `"0"`), always normalized.
    /// 2. A counter with the column's exact name.
    /// 3. A counter named `total_<column>`.
    /// 4. Otherwise 0.0, and the column is reported missing.
    pub fn project(&self, counters: &CounterMap) -> Projection {
        let mut projection = Projection {
            row: Vec::with_capacity(self.columns.len()),
            missing: Vec::new(),
            tag_source_missing: false,
            found: 0,
        };

        for column in &self.columns {
            if column == TAG_COLUMN {
                let value = match counters.get(POSIX_PERF_MIBS) {
                    Some(v) => {
                        projection.found += 1;
                        v.as_str()
                    }
                    None => {
                        projection.tag_source_missing = true;
                        "0"
                    }
                };
                projection.row.push(normalize_value(value, TAG_COLUMN));
                continue;
            }

            let raw = counters
                .get(column)
                .or_else(|| counters.get(&format!("{TOTAL_VARIANT_PREFIX}{column}")));
            match raw {
                Some(v) => {
                    let normalized = normalize_value(v, column);
                    tracing::trace!(column = %column, value = normalized, "normalized counter");
                    projection.found += 1;
                    projection.row.push(normalized);
                }
                None => {
                    projection.missing.push(column.clone());
                    projection.row.push(0.0);
                }
            }
        }

        projection
    }
}

/// One output row plus what was found and missed while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// One value per schema column, in schema order.
    pub row: Vec<f64>,
    /// Columns with no matching counter, in schema order. Excludes `tag`.
    pub missing: Vec<String>,
    /// True when the `tag` column had no `POSIX_PERF_MIBS` to draw from.
    pub tag_source_missing: bool,
    /// Number of columns populated from a counter.
    pub found: usize,
}

impl Projection {
    /// Missing entries for per-trace diagnostics, including the tag source.
    pub fn missing_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.missing.len() + 1);
        if self.tag_source_missing {
            labels.push(format!("{POSIX_PERF_MIBS} (for {TAG_COLUMN})"));
        }
        labels.extend(self.missing.iter().cloned());
        labels
    }
}

#[derive(Debug)]
pub enum SchemaError {
    Csv { path: PathBuf, source: csv::Error },
    Empty { path: PathBuf },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::Csv { path, source } => {
                write!(f, "failed to read schema from {}: {}", path.display(), source)
            }
            SchemaError::Empty { path } => {
                write!(f, "schema file {} has no header row", path.display())
            }
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Csv { source, .. } => Some(source),
            SchemaError::Empty { .. } => None,
        }
    }
}
