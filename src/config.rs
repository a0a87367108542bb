use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from darshan-features.toml.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct FeatureConfig {
    pub dumper: DumperConfig,
    pub discovery: DiscoveryConfig,
    pub report: ReportConfig,
    pub scratch: ScratchConfig,
}

/// How to invoke the external trace-dump utility.
///
/// Each argument list may contain `{trace}` placeholders, replaced with the
/// path of the trace being dumped.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DumperConfig {
    pub command: String,
    pub total_args: Vec<String>,
    pub perf_args: Vec<String>,
    pub records_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Trace file extension, without the leading dot.
    pub extension: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub log_missing: bool,
    pub missing_detail_limit: usize,
    pub summary_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct ScratchConfig {
    /// Explicit scratch directory. When unset a temporary directory is used.
    pub dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            command: "darshan-parser".to_string(),
            total_args: vec!["--total".to_string(), "{trace}".to_string()],
            perf_args: vec!["--perf".to_string(), "{trace}".to_string()],
            records_args: vec!["{trace}".to_string()],
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extension: "darshan".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            log_missing: true,
            missing_detail_limit: 10,
            summary_limit: 20,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<FeatureConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(FeatureConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
