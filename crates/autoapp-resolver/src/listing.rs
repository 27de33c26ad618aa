use anyhow::{Context, Result};
use regex::Regex;

/// Pattern for `{name}-MAJOR.MINOR.PATCH[.EXTRA]` followed by `.` or `-`
/// inside distribution file names. Index file names normalise `-`, `_` and
/// `.` in the project name, so any of them matches.
pub fn version_pattern(name: &str) -> Result<Regex> {
    let name_pattern = name
        .split(['-', '_', '.'])
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[-_.]");
    let pattern = format!(r"(?i)(?:^|[^A-Za-z0-9_.\-]){name_pattern}-(\d+\.\d+\.\d+(?:\.\w*\d+)?)[.\-]");
    Regex::new(&pattern).with_context(|| format!("failed to build version pattern for {name}"))
}

/// Version tokens found in a simple-index listing page, in page order and
/// without duplicates.
pub fn extract_versions(name: &str, listing: &str) -> Result<Vec<String>> {
    let pattern = version_pattern(name)?;
    let mut versions: Vec<String> = Vec::new();
    for line in listing.lines() {
        for captures in pattern.captures_iter(line) {
            let Some(version) = captures.get(1) else {
                continue;
            };
            let version = version.as_str();
            if !versions.iter().any(|seen| seen == version) {
                versions.push(version.to_string());
            }
        }
    }
    Ok(versions)
}
