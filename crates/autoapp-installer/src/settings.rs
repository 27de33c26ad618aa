use anyhow::{Context, Result};
use autoapp_core::UpdatePolicy;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";
pub const KEY_APP_SPEC: &str = "app_spec";
pub const KEY_RUNTIME_VERSION: &str = "runtime_version";
pub const KEY_UPDATE: &str = "update";

/// Per-app persisted settings, stored as a flat JSON object next to the
/// app's versions. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Settings {
    pub fn load(app_path: &Path) -> Self {
        let path = app_path.join(SETTINGS_FILE);
        let Ok(raw) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Ok(values) => Self { values },
            Err(err) => {
                tracing::debug!("ignoring unreadable settings {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn app_spec(&self) -> Option<&str> {
        self.get_str(KEY_APP_SPEC)
    }

    pub fn runtime_version(&self) -> Option<&str> {
        self.get_str(KEY_RUNTIME_VERSION)
    }

    pub fn update_policy(&self) -> Option<UpdatePolicy> {
        let raw = self.get_str(KEY_UPDATE)?;
        match UpdatePolicy::parse(raw) {
            Ok(policy) => Some(policy),
            Err(err) => {
                tracing::debug!("ignoring stored update policy: {err}");
                None
            }
        }
    }

    /// Returns a copy with `patch` applied; `Value::Null` removes a key.
    pub fn merged(&self, patch: &[(&str, Value)]) -> Self {
        let mut values = self.values.clone();
        for (key, value) in patch {
            if value.is_null() {
                values.remove(*key);
            } else {
                values.insert((*key).to_string(), value.clone());
            }
        }
        Self { values }
    }

    pub fn write(&self, app_path: &Path) -> Result<()> {
        let path = app_path.join(SETTINGS_FILE);
        let staging = app_path.join(format!("{SETTINGS_FILE}.tmp"));
        let body = serde_json::to_string_pretty(&self.values)
            .context("failed to serialize settings")?;
        fs::write(&staging, body)
            .with_context(|| format!("failed to write settings: {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to write settings: {}", path.display()))
    }
}
