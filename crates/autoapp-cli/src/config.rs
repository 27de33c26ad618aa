use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autoapp_installer::{RootTiers, TierPaths};
use serde::Deserialize;

pub(crate) const CONFIG_ENV: &str = "AUTOAPP_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) index_url: Option<String>,
    pub(crate) runtime_version: String,
    pub(crate) fallback_runtime_version: Option<String>,
    pub(crate) roots: RootsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_url: None,
            runtime_version: "3".to_string(),
            fallback_runtime_version: Some("3.8".to_string()),
            roots: RootsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct RootsConfig {
    pub(crate) system: TierConfig,
    pub(crate) local: TierConfig,
    pub(crate) user: TierConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct TierConfig {
    pub(crate) install: Option<PathBuf>,
    pub(crate) symlink: Option<PathBuf>,
    pub(crate) log: Option<PathBuf>,
}

impl TierConfig {
    fn apply(&self, tier: TierPaths) -> TierPaths {
        TierPaths {
            install_root: self.install.clone().unwrap_or(tier.install_root),
            symlink_root: self.symlink.clone().unwrap_or(tier.symlink_root),
            log_root: self.log.clone().unwrap_or(tier.log_root),
        }
    }
}

impl Config {
    pub(crate) fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse configuration")
    }

    /// Reads `$AUTOAPP_CONFIG`, else `~/.config/autoapp/config.toml`. A
    /// missing file means defaults.
    pub(crate) fn load(home: Option<&Path>) -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => match home {
                Some(home) => default_config_path(home),
                None => return Ok(Self::default()),
            },
        };
        Self::load_from(&path)
    }

    pub(crate) fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw).with_context(|| format!("invalid config: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read config: {}", path.display())),
        }
    }

    pub(crate) fn root_tiers(&self, tiers: RootTiers) -> RootTiers {
        RootTiers {
            system: self.roots.system.apply(tiers.system),
            local: self.roots.local.apply(tiers.local),
            user: self.roots.user.apply(tiers.user),
        }
    }
}

pub(crate) fn default_config_path(home: &Path) -> PathBuf {
    home.join(".config").join("autoapp").join("config.toml")
}
