use thiserror::Error;

/// Failures callers need to tell apart. They usually travel inside an
/// `anyhow::Error` and are recovered with `downcast_ref`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("{name} does not exist on {index_url}")]
    NotFound { name: String, index_url: String },

    #[error("No app version found in {url}")]
    EmptyIndex { url: String },

    #[error("No app version matching {spec}\nAvailable versions: {}", available.join(", "))]
    Unsatisfiable {
        spec: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    MissingCollaborator(String),

    #[error("{0}")]
    InvalidAction(String),

    #[error("{message}")]
    InstallToolFailure { message: String, output: String },

    #[error("invalid app spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("{0}")]
    UninstallBlocked(String),

    /// Raised after a batch when at least one item failed. The individual
    /// failures were already reported, so it carries no message.
    #[error("")]
    AggregateFailure,
}

impl AppError {
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::EmptyIndex { .. } | Self::Unsatisfiable { .. }
        )
    }
}
