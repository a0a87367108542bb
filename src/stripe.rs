//! Lustre striping parameters from the raw record report.
//!
//! Every file-open record on a Lustre mount carries its own stripe width and
//! size. A trace is summarized by the mean of the positive observations,
//! truncated to an integer. Attributes with no valid observation are left out
//! of the counter map entirely.

use crate::counters::CounterMap;

pub const LUSTRE_STRIPE_WIDTH: &str = "LUSTRE_STRIPE_WIDTH";
pub const LUSTRE_STRIPE_SIZE: &str = "LUSTRE_STRIPE_SIZE";

const RECORD_PREFIX: &str = "LUSTRE";

/// Reduce raw record-report lines to `<counter>\t<value>` rows.
///
/// Keeps lines starting with `LUSTRE` and, of those, the 4th and 5th
/// tab-separated fields. A line without any tab is kept whole.
pub fn filter_records<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| line.starts_with(RECORD_PREFIX))
        .map(|line| {
            if !line.contains('\t') {
                return line.to_string();
            }
            line.split('\t').skip(3).take(2).collect::<Vec<_>>().join("\t")
        })
        .collect()
}

/// Positive stripe observations gathered across a trace's records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StripeObservations {
    pub widths: Vec<u64>,
    pub sizes: Vec<u64>,
}

impl StripeObservations {
    /// Accumulate observations from `<counter>\t<value>` rows.
    ///
    /// Rows with a non-integer or non-positive value are skipped with a
    /// warning; other counters are ignored.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Self {
        let mut obs = Self::default();
        if rows.is_empty() {
            tracing::debug!("no Lustre data found in trace");
        }
        for row in rows {
            obs.observe(row.as_ref());
        }
        obs
    }

    fn observe(&mut self, row: &str) {
        tracing::debug!(row = row.trim(), "raw Lustre row");
        let parts: Vec<&str> = row.trim().split('\t').collect();
        if parts.len() < 2 {
            return;
        }
        let target = match parts[0] {
            LUSTRE_STRIPE_WIDTH => &mut self.widths,
            LUSTRE_STRIPE_SIZE => &mut self.sizes,
            _ => return,
        };
        let value = match parts[1].trim().parse::<i64>() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(counter = parts[0], value = parts[1], error = %e, "failed to parse Lustre value");
                return;
            }
        };
        if value <= 0 {
            tracing::warn!(counter = parts[0], value, "invalid stripe value, skipping");
            return;
        }
        target.push(value as u64);
    }

    pub fn width(&self) -> Option<u64> {
        representative(&self.widths)
    }

    pub fn size(&self) -> Option<u64> {
        representative(&self.sizes)
    }

    /// Write the representative values into `counters`. Absent attributes are
    /// not written.
    pub fn apply(&self, counters: &mut CounterMap) {
        for (name, values, rep) in [
            (LUSTRE_STRIPE_WIDTH, &self.widths, self.width()),
            (LUSTRE_STRIPE_SIZE, &self.sizes, self.size()),
        ] {
            match rep {
                Some(v) => {
                    tracing::debug!(counter = name, value = v, observations = ?values, "stripe representative");
                    counters.insert(name.to_string(), v.to_string());
                }
                None => tracing::debug!(counter = name, "no valid observations, leaving unset"),
            }
        }
    }
}

/// Integer mean of the observations, or `None` when there are none.
pub fn representative(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let sum: u128 = values.iter().map(|&v| v as u128).sum();
    Some((sum / values.len() as u128) as u64)
}
