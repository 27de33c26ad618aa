mod error;
mod policy;
mod request;
mod scrub;
mod spec;
mod version;

pub use error::AppError;
pub use policy::UpdatePolicy;
pub use request::Request;
pub use scrub::scrub_credentials;
pub use spec::{AppSpec, Clause, Operator, VersionConstraint};
pub use version::{compare_versions, sorted_versions, version_key};

/// Name of the package that ships this tool. It is managed like any other
/// application but gets special treatment for symlinks and uninstall order.
pub const BOOTSTRAP_APP: &str = "autoapp";

#[cfg(test)]
mod tests;
