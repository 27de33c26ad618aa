mod listing;
mod select;

pub use listing::{extract_versions, version_pattern};
pub use select::{partition_versions, select_highest, Partitioned};
