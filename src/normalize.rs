/// Value normalization: raw counter string to `log10(max(v, 0) + 1)`.
///
/// Non-numeric, negative, NaN and infinite inputs all map to 0.0 with a
/// warning. Zero maps to exactly 0.0, so an absent counter and a counter that
/// is explicitly zero look the same downstream.
pub fn normalize_value(value: &str, column: &str) -> f64 {
    let numeric = match value.trim().parse::<f64>() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(column, value, error = %e, "cannot normalize value, using 0");
            return 0.0;
        }
    };
    if numeric.is_nan() {
        tracing::warn!(column, "NaN value, using 0");
        return 0.0;
    }
    if numeric.is_infinite() {
        tracing::warn!(column, "infinite value, using 0");
        return 0.0;
    }
    if numeric < 0.0 {
        tracing::warn!(column, value = numeric, "negative value, using 0");
        return 0.0;
    }
    (numeric + 1.0).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_maps_to_exactly_zero() {
        assert_eq!(normalize_value("0", "c"), 0.0);
        assert_eq!(normalize_value("0.0", "c"), 0.0);
    }

    #[test]
    fn applies_log10_plus_one() {
        assert_eq!(normalize_value("9", "c"), 1.0);
        assert_eq!(normalize_value("99", "c"), 2.0);
        assert!((normalize_value("1024", "c") - 1025f64.log10()).abs() < 1e-12);
        assert!((normalize_value("150.5", "c") - 151.5f64.log10()).abs() < 1e-12);
    }

    #[test]
    fn surrounding_whitespace_is_accepted() {
        assert_eq!(normalize_value(" 9 ", "c"), 1.0);
    }

    #[test]
    fn invalid_inputs_map_to_zero() {
        for raw in ["", "abc", "12 MiB", "nan", "NaN", "inf", "-inf", "-1", "-0.5", "-1e300"] {
            assert_eq!(normalize_value(raw, "c"), 0.0, "{raw}");
        }
    }

    #[test]
    fn monotonic_for_non_negative_inputs() {
        let inputs = [0.0, 1e-9, 0.5, 1.0, 2.0, 10.0, 1e3, 1e6, 1e12, 1e300];
        let outputs: Vec<f64> = inputs
            .iter()
            .map(|v| normalize_value(&v.to_string(), "c"))
            .collect();
        for pair in outputs.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
        assert!(outputs.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn huge_finite_value_stays_finite() {
        let v = normalize_value(&f64::MAX.to_string(), "c");
        assert!(v.is_finite());
        assert!(v > 300.0);
    }
}
