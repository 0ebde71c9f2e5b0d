//! Arithmetic over Kubernetes resource quantities.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use ui_server_k8s_api::ui::ResourceList;

/// Resource amounts by resource name, in base units.
pub type Amounts = BTreeMap<String, f64>;

const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parses a quantity such as `250m`, `1.5Gi` or `1e3` into base units.
pub fn parse(q: &str) -> Option<f64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    for (suffix, factor) in SUFFIXES {
        if let Some(num) = q.strip_suffix(suffix) {
            return num.parse::<f64>().ok().map(|n| n * factor);
        }
    }
    q.parse::<f64>().ok()
}

/// Formats an amount in base units. Fractional amounts are given in milli-units.
pub fn format(v: f64) -> String {
    if v.fract().abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{}m", (v * 1000.0).round() as i64)
    }
}

/// Reads a `ResourceList`-shaped JSON object. Unparsable entries are skipped.
pub fn amounts(value: Option<&serde_json::Value>) -> Amounts {
    let Some(obj) = value.and_then(|v| v.as_object()) else {
        return Amounts::new();
    };
    obj.iter()
        .filter_map(|(name, q)| {
            let v = match q {
                serde_json::Value::String(s) => parse(s)?,
                serde_json::Value::Number(n) => n.as_f64()?,
                _ => return None,
            };
            Some((name.clone(), v))
        })
        .collect()
}

pub fn add(dst: &mut Amounts, src: &Amounts) {
    for (name, v) in src {
        *dst.entry(name.clone()).or_default() += v;
    }
}

/// Raises each amount in `dst` to at least the one in `src`.
pub fn max(dst: &mut Amounts, src: &Amounts) {
    for (name, v) in src {
        let cur = dst.entry(name.clone()).or_default();
        if *v > *cur {
            *cur = *v;
        }
    }
}

pub fn scale(amounts: &Amounts, factor: f64) -> Amounts {
    amounts
        .iter()
        .map(|(name, v)| (name.clone(), v * factor))
        .collect()
}

pub fn to_list(amounts: &Amounts) -> ResourceList {
    amounts
        .iter()
        .map(|(name, v)| (name.clone(), Quantity(format(*v))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    #[test]
    fn parses_suffixes() {
        assert_eq!(parse("250m"), Some(0.25));
        assert_eq!(parse("2"), Some(2.0));
        assert_eq!(parse("1Ki"), Some(1024.0));
        assert_eq!(parse("1.5Gi"), Some(1.5 * 1024.0 * 1024.0 * 1024.0));
        assert_eq!(parse("1e3"), Some(1000.0));
        assert_eq!(parse("3M"), Some(3e6));
        assert_eq!(parse("lots"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn sums_and_formats() {
        let mut total = amounts(Some(&json!({ "cpu": "250m", "memory": "64Mi" })));
        add(&mut total, &amounts(Some(&json!({ "cpu": "1", "memory": "64Mi", "bogus": [] }))));
        assert_eq!(
            to_list(&scale(&total, 2.0)),
            btreemap! {
                "cpu".to_string() => Quantity("2500m".to_string()),
                "memory".to_string() => Quantity((256 * 1024 * 1024).to_string()),
            }
        );
    }

    #[test]
    fn max_keeps_larger() {
        let mut a = btreemap! { "cpu".to_string() => 0.5 };
        max(&mut a, &btreemap! { "cpu".to_string() => 1.0, "memory".to_string() => 10.0 });
        assert_eq!(a, btreemap! { "cpu".to_string() => 1.0, "memory".to_string() => 10.0 });
    }
}
