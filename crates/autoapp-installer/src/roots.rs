use anyhow::{Context, Result};
use autoapp_core::BOOTSTRAP_APP;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fs_utils::canonicalize_lenient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    System,
    Local,
    User,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Local => "local",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three directories one tier contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPaths {
    pub install_root: PathBuf,
    pub symlink_root: PathBuf,
    pub log_root: PathBuf,
}

impl TierPaths {
    pub fn new(
        install_root: impl Into<PathBuf>,
        symlink_root: impl Into<PathBuf>,
        log_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            symlink_root: symlink_root.into(),
            log_root: log_root.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTiers {
    pub system: TierPaths,
    pub local: TierPaths,
    pub user: TierPaths,
}

impl RootTiers {
    pub fn well_known(home: &Path) -> Self {
        let log_dir = format!("log/{BOOTSTRAP_APP}");
        Self {
            system: TierPaths::new(
                "/opt/apps",
                "/usr/local/bin",
                Path::new("/var").join(&log_dir),
            ),
            local: TierPaths::new(
                "/usr/local/opt/apps",
                "/usr/local/bin",
                Path::new("/usr/local/var").join(&log_dir),
            ),
            user: TierPaths::new(
                home.join(".apps"),
                home.join("bin"),
                home.join(".apps").join(".log"),
            ),
        }
    }

    pub fn from_env() -> Result<Self> {
        let home = std::env::var_os("HOME").context("HOME is not set")?;
        Ok(Self::well_known(Path::new(&home)))
    }

    pub fn install_roots(&self) -> [&Path; 3] {
        [
            &self.system.install_root,
            &self.local.install_root,
            &self.user.install_root,
        ]
    }
}

/// Why a tier was passed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRejection {
    pub tier: Tier,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSelection {
    pub roots: AppRoots,
    pub rejections: Vec<TierRejection>,
}

/// Install, symlink and log directories in effect for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRoots {
    pub tier: Tier,
    pub install_root: PathBuf,
    pub symlink_root: PathBuf,
    pub log_root: PathBuf,
    pub tiers: RootTiers,
}

impl AppRoots {
    /// Picks the first usable tier using real write permission checks and
    /// creates its directories.
    pub fn select(tiers: RootTiers) -> Result<RootSelection> {
        Self::select_with(tiers, can_write)
    }

    pub fn select_with(
        tiers: RootTiers,
        probe: impl Fn(&Path) -> bool,
    ) -> Result<RootSelection> {
        let mut rejections = Vec::new();

        let system = system_reasons(&tiers.system, &probe);
        let (tier, chosen) = if system.is_empty() {
            (Tier::System, tiers.system.clone())
        } else {
            rejections.push(TierRejection {
                tier: Tier::System,
                reasons: system,
            });
            let local = local_reasons(&tiers.local, &probe);
            if local.is_empty() {
                (Tier::Local, tiers.local.clone())
            } else {
                rejections.push(TierRejection {
                    tier: Tier::Local,
                    reasons: local,
                });
                (Tier::User, tiers.user.clone())
            }
        };

        for dir in [&chosen.install_root, &chosen.symlink_root, &chosen.log_root] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        }

        let roots = Self {
            tier,
            install_root: canonicalize_lenient(&chosen.install_root),
            symlink_root: canonicalize_lenient(&chosen.symlink_root),
            log_root: canonicalize_lenient(&chosen.log_root),
            tiers,
        };
        Ok(RootSelection { roots, rejections })
    }

    pub fn is_user(&self) -> bool {
        self.tier == Tier::User
    }

    /// True when `path` (followed through symlinks) lives under any known
    /// install root, not just the active one.
    pub fn covers(&self, path: &Path) -> bool {
        let resolved = canonicalize_lenient(path);
        self.tiers
            .install_roots()
            .into_iter()
            .chain(std::iter::once(self.install_root.as_path()))
            .any(|root| {
                resolved.starts_with(root) || resolved.starts_with(canonicalize_lenient(root))
            })
    }

    /// Hint for user-tier runs when the tool itself lives in the system
    /// symlink root, i.e. apps may exist that only root can see.
    pub fn privilege_hint(&self) -> Option<String> {
        self.shadowed_by_system().then(|| {
            format!(
                "To see apps installed in {}, re-run using sudo.",
                self.tiers.system.install_root.display()
            )
        })
    }

    /// Warning before the first user-tier install when a system-wide
    /// install of the tool exists.
    pub fn install_privilege_hint(&self) -> Vec<String> {
        if !self.shadowed_by_system() {
            return Vec::new();
        }
        vec![
            format!(
                "# Based on permission, this will install to your user home instead of {}",
                self.tiers.system.symlink_root.display()
            ),
            "  To install for everyone, cancel using CTRL+C and then re-run using sudo."
                .to_string(),
        ]
    }

    fn shadowed_by_system(&self) -> bool {
        self.is_user() && self.tiers.system.symlink_root.join(BOOTSTRAP_APP).exists()
    }
}

/// Write probe: tries to create (and drop) an anonymous file in `dir`.
pub fn can_write(dir: &Path) -> bool {
    tempfile::tempfile_in(dir).is_ok()
}

fn system_reasons(paths: &TierPaths, probe: &impl Fn(&Path) -> bool) -> Vec<String> {
    let mut reasons = Vec::new();
    for dir in [&paths.install_root, &paths.log_root] {
        let parent = dir.parent().unwrap_or(dir);
        if !probe(parent) {
            reasons.push(format!("{} is not writable", parent.display()));
        }
    }
    if !probe(&paths.symlink_root) {
        reasons.push(format!("{} is not writable", paths.symlink_root.display()));
    }
    reasons.sort();
    reasons.dedup();
    reasons
}

fn local_reasons(paths: &TierPaths, probe: &impl Fn(&Path) -> bool) -> Vec<String> {
    let mut reasons = Vec::new();
    for dir in [&paths.install_root, &paths.log_root] {
        let parent = dir.parent().unwrap_or(dir);
        let creatable = || {
            !parent.exists() && parent.parent().is_some_and(|grandparent| probe(grandparent))
        };
        if !probe(parent) && !creatable() {
            reasons.push(format!("{} is not writable", parent.display()));
        }
    }
    if !probe(&paths.symlink_root) {
        reasons.push(format!("{} is not writable", paths.symlink_root.display()));
    }
    reasons.sort();
    reasons.dedup();
    reasons
}
