//! Filter compilation.
//!
//! Turns a typed [`FilterSpec`] into the boolean expression language of the
//! search service. Each field yields at most one clause; clauses are joined
//! with `AND`.
//!
//! | Field / value | Clause |
//! |---------------|--------|
//! | `minPrice` = 10 | `price >= 10` |
//! | `maxPrice` = 50 | `price <= 50` |
//! | `isActive` = true | `isActive:true` |
//! | `city` = ["Porto", "Braga"] | `(city:"Porto" OR city:"Braga")` |
//! | `status` = "paid" | `status:"paid"` |
//! | `stock` = 3 | `stock = 3` |
//!
//! `min`/`max` only mark a range when followed by an uppercase letter
//! (`minPrice`); `min_price`, `minprice`, or `minutes` are ordinary fields and
//! compile to `field = n`.
//!
//! Absent values, empty arrays, and non-finite numbers produce nothing, so a
//! half-filled form never over-constrains results. An empty output means
//! "no filter".

use crate::models::{FilterSpec, FilterValue};

/// Compile a filter spec into a single expression string.
///
/// ```rust
/// use marketplace_search::filter::compile;
/// use marketplace_search::models::FilterSpec;
///
/// let spec = FilterSpec::new().with("minPrice", 10.0).with("maxPrice", 50.0);
/// assert_eq!(compile(&spec), "price >= 10 AND price <= 50");
/// ```
pub fn compile(spec: &FilterSpec) -> String {
    spec.iter()
        .filter_map(|(field, value)| clause(field, value))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Build the OR filter matching any of `ids` on `field`.
pub fn id_filter(field: &str, ids: &[String]) -> String {
    compile(&FilterSpec::new().with(field, ids.to_vec()))
}

fn clause(field: &str, value: &FilterValue) -> Option<String> {
    match value {
        FilterValue::Absent => None,
        FilterValue::Number(n) if !n.is_finite() => None,
        FilterValue::Number(n) => Some(match range_bound(field) {
            Some((name, Bound::Lower)) => format!("{} >= {}", name, format_number(*n)),
            Some((name, Bound::Upper)) => format!("{} <= {}", name, format_number(*n)),
            None => format!("{} = {}", field, format_number(*n)),
        }),
        FilterValue::Bool(b) => Some(format!("{}:{}", field, b)),
        FilterValue::AnyOf(values) if values.is_empty() => None,
        FilterValue::AnyOf(values) => {
            let alternatives: Vec<String> = values
                .iter()
                .map(|v| format!("{}:\"{}\"", field, escape(v)))
                .collect();
            Some(format!("({})", alternatives.join(" OR ")))
        }
        FilterValue::Exact(s) => Some(format!("{}:\"{}\"", field, escape(s))),
    }
}

enum Bound {
    Lower,
    Upper,
}

/// Split `minPrice` into (`price`, Lower). The prefix must sit on a camelCase
/// boundary, so `minutes` is an ordinary field.
fn range_bound(field: &str) -> Option<(String, Bound)> {
    let (rest, bound) = if let Some(rest) = field.strip_prefix("min") {
        (rest, Bound::Lower)
    } else if let Some(rest) = field.strip_prefix("max") {
        (rest, Bound::Upper)
    } else {
        return None;
    };

    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    let name: String = first.to_ascii_lowercase().to_string() + chars.as_str();
    Some((name, bound))
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Interpret a `key=value` CLI argument as a typed filter value.
///
/// Empty → absent, `true`/`false` → boolean, comma-separated → set,
/// finite number → number, anything else → exact string.
pub fn parse_cli_value(raw: &str) -> FilterValue {
    let raw = raw.trim();
    if raw.is_empty() {
        return FilterValue::Absent;
    }
    match raw {
        "true" => return FilterValue::Bool(true),
        "false" => return FilterValue::Bool(false),
        _ => {}
    }
    if raw.contains(',') {
        return FilterValue::AnyOf(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        );
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => FilterValue::Number(n),
        _ => FilterValue::Exact(raw.to_string()),
    }
}
