//! Kubernetes-aware ordering of API versions.
//!
//! GA versions outrank betas, which outrank alphas. Within a stage, larger major and then larger
//! minor numbers win. Versions that don't follow the `v<N>[alpha|beta<M>]` form rank below all
//! others and are ordered alphabetically.

use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Alpha,
    Beta,
    Ga,
}

fn parse(v: &str) -> Option<(Stage, u64, u64)> {
    let rest = v.strip_prefix('v')?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits == 0 {
        return None;
    }
    let major = rest[..digits].parse().ok()?;
    let rest = &rest[digits..];
    if rest.is_empty() {
        return Some((Stage::Ga, major, 0));
    }
    let (stage, minor) = if let Some(m) = rest.strip_prefix("beta") {
        (Stage::Beta, m)
    } else if let Some(m) = rest.strip_prefix("alpha") {
        (Stage::Alpha, m)
    } else {
        return None;
    };
    if minor.is_empty() || !minor.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((stage, major, minor.parse().ok()?))
}

/// Compares two versions by priority; `Greater` means `a` is preferred over `b`.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => b.cmp(a),
    }
}

/// Compares two `apiVersion` strings (`group/version`) by their version part.
pub fn compare_api_versions(a: &str, b: &str) -> Ordering {
    let version = |s: &str| s.rsplit('/').next().unwrap_or(s).to_string();
    compare(&version(a), &version(b))
}

/// Returns the preferred version among `versions`.
pub fn highest<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions.into_iter().max_by(|a, b| compare(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_stages() {
        assert_eq!(compare("v1", "v1beta1"), Ordering::Greater);
        assert_eq!(compare("v1beta1", "v1alpha1"), Ordering::Greater);
        assert_eq!(compare("v1alpha1", "v1"), Ordering::Less);
        assert_eq!(compare("v1", "v1"), Ordering::Equal);
    }

    #[test]
    fn orders_numbers() {
        assert_eq!(compare("v2", "v1"), Ordering::Greater);
        assert_eq!(compare("v10", "v2"), Ordering::Greater);
        assert_eq!(compare("v1beta2", "v1beta1"), Ordering::Greater);
        assert_eq!(compare("v2beta1", "v1beta2"), Ordering::Greater);
    }

    #[test]
    fn non_kube_versions_rank_last() {
        assert_eq!(compare("v1alpha1", "foo"), Ordering::Greater);
        assert_eq!(compare("foo1", "foo10"), Ordering::Greater);
        assert_eq!(compare("v1beta", "v1alpha1"), Ordering::Less);
    }

    #[test]
    fn picks_highest() {
        assert_eq!(highest(["v1alpha1", "v1", "v1beta1"]), Some("v1"));
        assert_eq!(
            compare_api_versions("kubedb.com/v1alpha2", "kubedb.com/v1"),
            Ordering::Less
        );
        assert_eq!(highest(std::iter::empty()), None);
    }
}
