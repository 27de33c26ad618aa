use autoapp_core::{compare_versions, sorted_versions, AppError, AppSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partitioned {
    pub matching: Vec<String>,
    pub other: Vec<String>,
}

pub fn partition_versions(spec: &AppSpec, versions: &[String]) -> Partitioned {
    let (matching, other): (Vec<String>, Vec<String>) = versions
        .iter()
        .cloned()
        .partition(|version| spec.matches(version));
    Partitioned { matching, other }
}

/// Highest version satisfying `spec`.
///
/// `source` names where the versions came from and is only used in the
/// empty-listing error.
pub fn select_highest(
    spec: &AppSpec,
    versions: &[String],
    source: &str,
) -> Result<String, AppError> {
    let partitioned = partition_versions(spec, versions);

    if let Some(best) = partitioned
        .matching
        .iter()
        .max_by(|a, b| compare_versions(a, b))
    {
        return Ok(best.clone());
    }

    if partitioned.other.is_empty() {
        return Err(AppError::EmptyIndex {
            url: source.to_string(),
        });
    }

    Err(AppError::Unsatisfiable {
        spec: spec.to_string(),
        available: sorted_versions(partitioned.other),
    })
}
