//! Counter extraction from the totals and performance reports of one trace.
//!
//! The totals report carries `total_<COUNTER>: <value>` lines plus a
//! `# nprocs: N` header. The performance report is split into per-module
//! sections; only the POSIX section's `agg_perf_by_slowest` estimate is kept.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Counter name to raw (string) value for one trace.
pub type CounterMap = HashMap<String, String>;

/// Synthetic counter holding the POSIX aggregate bandwidth in MiB/s.
pub const POSIX_PERF_MIBS: &str = "POSIX_PERF_MIBS";
/// Counter holding the job's process count.
pub const NPROCS: &str = "nprocs";

const TOTALS_PREFIX: &str = "total";
const POSIX_TOTAL_PREFIX: &str = "total_POSIX_";
const TOTAL_SUBPREFIX: &str = "total_";
const NPROCS_PREFIX: &str = "# nprocs:";

/// `agg_perf_by_slowest: <value> # MiB/s`; the capture stops at the comment.
static SLOWEST_PERF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"agg_perf_by_slowest:([^:#]*)").unwrap());

/// Section of the performance report currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Module {
    #[default]
    None,
    Posix,
    MpiIo,
    Stdio,
}

impl Module {
    /// Module introduced by a section-header line, if `line` is one.
    pub fn from_header(line: &str) -> Option<Module> {
        if line.contains("# POSIX module data") {
            Some(Module::Posix)
        } else if line.contains("# MPI-IO module data") {
            Some(Module::MpiIo)
        } else if line.contains("# STDIO module data") {
            Some(Module::Stdio)
        } else {
            None
        }
    }
}

/// Line-at-a-time scanner for the performance report.
///
/// Header lines move the scanner to a new module. Metric lines are only
/// reported while inside the POSIX section.
#[derive(Debug, Default)]
pub struct PerfScanner {
    module: Module,
}

impl PerfScanner {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn module(&self) -> Module {
        self.module
    }

    /// Feed one line. Returns `(counter, value)` when the line yields a metric.
    pub fn feed(&mut self, line: &str) -> Option<(&'static str, String)> {
        if let Some(module) = Module::from_header(line) {
            tracing::trace!(from = ?self.module, to = ?module, "module section");
            self.module = module;
            return None;
        }
        if self.module != Module::Posix {
            return None;
        }
        let caps = SLOWEST_PERF.captures(line)?;
        let value = caps[1].trim().to_string();
        Some((POSIX_PERF_MIBS, value))
    }
}

/// Check a totals value. Non-numeric and non-finite values become `"0"`;
/// negative values are kept and left for the normalizer to clamp.
fn sanitize_total(key: &str, value: &str) -> String {
    match value.parse::<f64>() {
        Ok(v) if !v.is_finite() => {
            tracing::warn!(counter = key, value, "invalid counter value, using 0");
            "0".to_string()
        }
        Ok(v) if v < 0.0 => {
            tracing::warn!(counter = key, value, "negative counter value");
            value.to_string()
        }
        Ok(_) => value.to_string(),
        Err(_) => {
            tracing::warn!(counter = key, value, "non-numeric counter value, using 0");
            "0".to_string()
        }
    }
}

/// Parse the totals report into counters.
///
/// `total_POSIX_*` keys lose their `total_` prefix so they line up with the
/// schema's naming; other modules keep the prefix.
pub fn parse_totals<S: AsRef<str>>(lines: &[S]) -> CounterMap {
    let mut counters = CounterMap::new();
    for line in lines {
        let line = line.as_ref();
        if !line.starts_with(TOTALS_PREFIX) {
            continue;
        }
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.contains("POSIX") {
            tracing::debug!(counter = key, value, "raw totals counter");
        }

        let value = sanitize_total(key, value);
        let key = if key.starts_with(POSIX_TOTAL_PREFIX) {
            key.replacen(TOTAL_SUBPREFIX, "", 1)
        } else {
            key.to_string()
        };
        counters.insert(key, value);
    }
    counters
}

/// Process count from the first `# nprocs:` header of the totals report.
pub fn parse_nprocs<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .find(|line| line.starts_with(NPROCS_PREFIX))
        .and_then(|line| line.split(':').nth(1))
        .map(|v| v.trim().to_string())
}

/// Scan the performance report, adding module-scoped metrics to `counters`.
/// A later occurrence of a metric overwrites an earlier one.
pub fn parse_perf<S: AsRef<str>>(lines: &[S], counters: &mut CounterMap) {
    let mut scanner = PerfScanner::new();
    for line in lines {
        if let Some((counter, value)) = scanner.feed(line.as_ref()) {
            tracing::debug!(counter, value = %value, "performance metric");
            counters.insert(counter.to_string(), value);
        }
    }
}

/// Combine the totals and performance reports of one trace.
pub fn extract_counters<S: AsRef<str>, P: AsRef<str>>(totals: &[S], perf: &[P]) -> CounterMap {
    let mut counters = parse_totals(totals);
    parse_perf(perf, &mut counters);
    if let Some(nprocs) = parse_nprocs(totals) {
        tracing::debug!(nprocs = %nprocs, "process count");
        counters.insert(NPROCS.to_string(), nprocs);
    }
    counters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_strip_posix_prefix_only() {
        let c = parse_totals(&[
            "total_POSIX_BYTES_WRITTEN: 1024",
            "total_MPIIO_INDEP_WRITES: 3",
            "total_STDIO_OPENS: 2",
        ]);
        assert_eq!(c.get("POSIX_BYTES_WRITTEN").map(String::as_str), Some("1024"));
        assert_eq!(c.get("total_MPIIO_INDEP_WRITES").map(String::as_str), Some("3"));
        assert_eq!(c.get("total_STDIO_OPENS").map(String::as_str), Some("2"));
        assert!(!c.contains_key("total_POSIX_BYTES_WRITTEN"));
    }

    #[test]
    fn totals_ignore_unprefixed_lines() {
        let c = parse_totals(&[
            "# darshan log version: 3.41",
            "# nprocs: 4",
            "",
            "POSIX_OPENS: 9",
            "total_POSIX_OPENS: 2",
        ]);
        assert_eq!(c.len(), 1);
        assert_eq!(c["POSIX_OPENS"], "2");
    }

    #[test]
    fn totals_split_on_first_colon() {
        let c = parse_totals(&["total_POSIX_F_META_TIME: 0.5:extra"]);
        // "0.5:extra" is not numeric.
        assert_eq!(c["POSIX_F_META_TIME"], "0");
    }

    #[test]
    fn totals_line_without_colon_skipped() {
        let c = parse_totals(&["total_POSIX_OPENS 3"]);
        assert!(c.is_empty());
    }

    #[test]
    fn totals_non_numeric_and_non_finite_become_zero() {
        let c = parse_totals(&[
            "total_POSIX_A: abc",
            "total_POSIX_B: nan",
            "total_POSIX_C: inf",
            "total_POSIX_D: -inf",
        ]);
        for key in ["POSIX_A", "POSIX_B", "POSIX_C", "POSIX_D"] {
            assert_eq!(c[key], "0", "{key}");
        }
    }

    #[test]
    fn totals_negative_values_are_kept() {
        let c = parse_totals(&["total_POSIX_MAX_BYTE_READ: -1"]);
        assert_eq!(c["POSIX_MAX_BYTE_READ"], "-1");
    }

    #[test]
    fn totals_values_are_trimmed() {
        let c = parse_totals(&["total_POSIX_READS:    17   "]);
        assert_eq!(c["POSIX_READS"], "17");
    }

    #[test]
    fn nprocs_first_occurrence() {
        let lines = ["# exe: ./ior", "# nprocs: 64", "# nprocs: 8"];
        assert_eq!(parse_nprocs(&lines).as_deref(), Some("64"));
    }

    #[test]
    fn nprocs_absent() {
        let lines = ["total_POSIX_OPENS: 1"];
        assert_eq!(parse_nprocs(&lines), None);
    }

    #[test]
    fn header_transitions() {
        assert_eq!(Module::from_header("# POSIX module data"), Some(Module::Posix));
        assert_eq!(Module::from_header("# MPI-IO module data"), Some(Module::MpiIo));
        assert_eq!(Module::from_header("# STDIO module data"), Some(Module::Stdio));
        assert_eq!(Module::from_header("# agg_perf_by_slowest: 1.0"), None);
    }

    #[test]
    fn scanner_tracks_module() {
        let mut s = PerfScanner::new();
        assert_eq!(s.module(), Module::None);
        s.feed("# MPI-IO module data");
        assert_eq!(s.module(), Module::MpiIo);
        s.feed("# POSIX module data");
        assert_eq!(s.module(), Module::Posix);
        s.feed("# STDIO module data");
        assert_eq!(s.module(), Module::Stdio);
    }

    #[test]
    fn perf_extracts_posix_value_before_comment() {
        let mut c = CounterMap::new();
        parse_perf(
            &["# POSIX module data", "# agg_perf_by_slowest: 150.5 # MiB/s"],
            &mut c,
        );
        assert_eq!(c[POSIX_PERF_MIBS], "150.5");
    }

    #[test]
    fn perf_before_any_header_is_ignored() {
        let mut c = CounterMap::new();
        parse_perf(
            &["# agg_perf_by_slowest: 99.0 # MiB/s", "# POSIX module data"],
            &mut c,
        );
        assert!(!c.contains_key(POSIX_PERF_MIBS));
    }

    #[test]
    fn perf_in_other_modules_is_ignored() {
        let mut c = CounterMap::new();
        parse_perf(
            &[
                "# MPI-IO module data",
                "# agg_perf_by_slowest: 10.0 # MiB/s",
                "# STDIO module data",
                "# agg_perf_by_slowest: 20.0 # MiB/s",
            ],
            &mut c,
        );
        assert!(c.is_empty());
    }

    #[test]
    fn perf_posix_section_ends_at_next_header() {
        let mut c = CounterMap::new();
        parse_perf(
            &[
                "# POSIX module data",
                "# agg_perf_by_slowest: 150.5 # MiB/s",
                "# STDIO module data",
                "# agg_perf_by_slowest: 3.0 # MiB/s",
            ],
            &mut c,
        );
        assert_eq!(c[POSIX_PERF_MIBS], "150.5");
    }

    #[test]
    fn extract_combines_reports() {
        let totals = ["# nprocs: 4", "total_POSIX_BYTES_WRITTEN: 1024"];
        let perf = ["# POSIX module data", "agg_perf_by_slowest: 150.5 # MiB/s"];
        let c = extract_counters(&totals, &perf);
        assert_eq!(c.len(), 3);
        assert_eq!(c["POSIX_BYTES_WRITTEN"], "1024");
        assert_eq!(c[POSIX_PERF_MIBS], "150.5");
        assert_eq!(c[NPROCS], "4");
    }

    #[test]
    fn extract_with_empty_perf_report() {
        let totals = ["total_POSIX_OPENS: 5"];
        let perf: [&str; 0] = [];
        let c = extract_counters(&totals, &perf);
        assert_eq!(c.len(), 1);
        assert!(!c.contains_key(POSIX_PERF_MIBS));
    }
}
