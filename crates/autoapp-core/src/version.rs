use std::cmp::Ordering;

/// Integer tuple for a version string, split on every non-digit run.
pub fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

pub fn compare_versions(left: &str, right: &str) -> Ordering {
    version_key(left)
        .cmp(&version_key(right))
        .then_with(|| left.cmp(right))
}

/// Ascending, deduplicated.
pub fn sorted_versions<I, S>(versions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sorted: Vec<String> = versions.into_iter().map(Into::into).collect();
    sorted.sort_by(|a, b| compare_versions(a, b));
    sorted.dedup();
    sorted
}

pub(crate) fn padded_cmp(left: &[u64], right: &[u64]) -> Ordering {
    let len = left.len().max(right.len());
    for index in 0..len {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
