use crate::UpdatePolicy;

/// One entry of the install queue.
///
/// `Named` follows whatever policy the batch was started with. `Pinned`
/// carries its own policy decision, which may be "no auto-update", and comes
/// from persisted settings or from another app's group-specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Named(String),
    Pinned(String, Option<UpdatePolicy>),
}

impl Request {
    pub fn spec(&self) -> &str {
        match self {
            Self::Named(spec) | Self::Pinned(spec, _) => spec,
        }
    }

    pub fn policy(&self, batch_policy: Option<UpdatePolicy>) -> Option<UpdatePolicy> {
        match self {
            Self::Named(_) => batch_policy,
            Self::Pinned(_, policy) => *policy,
        }
    }
}

impl From<&str> for Request {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for Request {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}
