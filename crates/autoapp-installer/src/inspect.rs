use anyhow::{bail, Result};
use autoapp_core::{Request, UpdatePolicy, BOOTSTRAP_APP};
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::fs_utils::canonicalize_lenient;

/// Entry point group an app uses to declare companion apps.
pub const GROUP_ENTRY_POINT: &str = BOOTSTRAP_APP;

const CONSOLE_SCRIPTS: &str = "console_scripts";

static RECORD_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\.\./)+bin/([^,/]+)(?:,|$)").expect("script record pattern must compile")
});

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("name separator pattern must compile"));

/// A companion app declared as `app = version [policy]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub app: String,
    pub version: String,
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub scripts: BTreeSet<String>,
    pub group_entries: Vec<GroupEntry>,
}

pub trait PackageInspector {
    /// Reads what `name` installed into the environment at `env_path`.
    fn inspect(&self, name: &str, env_path: &Path) -> Result<PackageInfo>;
}

/// Reads installed distribution metadata (`*.dist-info` / `*.egg-info`)
/// from an environment's site-packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistInfoInspector;

impl PackageInspector for DistInfoInspector {
    fn inspect(&self, name: &str, env_path: &Path) -> Result<PackageInfo> {
        let metadata_dir = find_metadata_dir(name, env_path)?;

        let mut info = PackageInfo::default();
        let entry_points = metadata_dir.join("entry_points.txt");
        if let Ok(raw) = fs::read_to_string(&entry_points) {
            let sections = parse_entry_points(&raw);
            if let Some(scripts) = sections.get(CONSOLE_SCRIPTS) {
                info.scripts = scripts.iter().map(|(script, _)| script.clone()).collect();
            }
            if let Some(entries) = sections.get(GROUP_ENTRY_POINT) {
                info.group_entries = entries
                    .iter()
                    .map(|(app, value)| parse_group_entry(app, value))
                    .collect();
            }
        }

        if info.scripts.is_empty() {
            info.scripts = recorded_scripts(&metadata_dir);
        }
        Ok(info)
    }
}

fn find_metadata_dir(name: &str, env_path: &Path) -> Result<PathBuf> {
    let wanted = normalize_name(name);
    for site_packages in site_packages_dirs(env_path) {
        let Ok(entries) = fs::read_dir(&site_packages) else {
            continue;
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = file_name
                .strip_suffix(".dist-info")
                .or_else(|| file_name.strip_suffix(".egg-info"))
            else {
                continue;
            };
            let project = stem.split('-').next().unwrap_or(stem);
            if normalize_name(project) == wanted && entry.path().is_dir() {
                return Ok(entry.path());
            }
        }
    }
    bail!(
        "no installed distribution metadata for {name} in {}",
        env_path.display()
    )
}

fn site_packages_dirs(env_path: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for lib in ["lib", "lib64"] {
        let Ok(entries) = fs::read_dir(env_path.join(lib)) else {
            continue;
        };
        let mut found: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
            .map(|entry| entry.path().join("site-packages"))
            .filter(|path| path.is_dir())
            .collect();
        found.sort();
        dirs.extend(found);
    }
    dirs
}

fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(name, "-").to_ascii_lowercase()
}

/// Splits an INI-like `entry_points.txt` into `section -> [(name, value)]`.
pub(crate) fn parse_entry_points(raw: &str) -> HashMap<String, Vec<(String, String)>> {
    let mut sections: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut current: Option<String> = None;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            current = Some(section.trim().to_string());
            continue;
        }
        let (Some(section), Some((key, value))) = (&current, line.split_once('=')) else {
            continue;
        };
        sections
            .entry(section.clone())
            .or_default()
            .push((key.trim().to_string(), value.trim().to_string()));
    }
    sections
}

/// `0.1 [daily]` -> version `0.1`, policy `daily`. A `module:attr` reference
/// before the extras is reduced to its module part.
pub(crate) fn parse_group_entry(app: &str, value: &str) -> GroupEntry {
    let (head, extras) = match value.split_once('[') {
        Some((head, rest)) => (head, Some(rest.trim_end_matches(']'))),
        None => (value, None),
    };
    let version = head.split(':').next().unwrap_or(head).trim().to_string();
    let policy = extras
        .and_then(|extras| extras.split(',').next())
        .map(str::trim)
        .filter(|policy| !policy.is_empty())
        .map(str::to_string);
    GroupEntry {
        app: app.to_string(),
        version,
        policy,
    }
}

fn recorded_scripts(metadata_dir: &Path) -> BTreeSet<String> {
    ["RECORD", "installed-files.txt"]
        .iter()
        .filter_map(|file| fs::read_to_string(metadata_dir.join(file)).ok())
        .flat_map(|raw| {
            raw.lines()
                .filter_map(|line| RECORD_SCRIPT.captures(line.trim()))
                .map(|captures| captures[1].to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Converts declared companion apps into install requests.
///
/// `latest` follows the newest release, a short version (fewer than three
/// components) follows that series, and a full version is an exact pin
/// without auto-update.
pub fn group_requests(entries: &[GroupEntry]) -> Vec<Request> {
    entries
        .iter()
        .map(|entry| {
            let policy = || {
                entry
                    .policy
                    .as_deref()
                    .and_then(|raw| match UpdatePolicy::parse(raw) {
                        Ok(policy) => Some(policy),
                        Err(err) => {
                            tracing::debug!("{}: {err}", entry.app);
                            None
                        }
                    })
                    .unwrap_or(UpdatePolicy::DEFAULT)
            };

            if entry.version == "latest" {
                Request::Pinned(entry.app.clone(), Some(policy()))
            } else if entry.version.split('.').count() < 3 {
                Request::Pinned(format!("{}=={}.*", entry.app, entry.version), Some(policy()))
            } else {
                Request::Pinned(format!("{}=={}", entry.app, entry.version), None)
            }
        })
        .collect()
}

/// Memoizes inspection results per app and resolved environment path.
pub struct IntrospectionCache {
    inspector: Box<dyn PackageInspector>,
    entries: RefCell<HashMap<(String, PathBuf), PackageInfo>>,
}

impl IntrospectionCache {
    pub fn new(inspector: Box<dyn PackageInspector>) -> Self {
        Self {
            inspector,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Inspection result for `name` in `env_path`; empty when the
    /// environment can not be read.
    pub fn info(&self, name: &str, env_path: &Path) -> PackageInfo {
        let key = (name.to_string(), canonicalize_lenient(env_path));
        if let Some(info) = self.entries.borrow().get(&key) {
            return info.clone();
        }

        match self.inspector.inspect(name, &key.1) {
            Ok(info) => {
                self.entries.borrow_mut().insert(key, info.clone());
                info
            }
            Err(err) => {
                tracing::debug!("{err:#}");
                PackageInfo::default()
            }
        }
    }

    pub fn forget(&self, name: &str) {
        self.entries
            .borrow_mut()
            .retain(|(cached, _), _| cached != name);
    }
}

impl std::fmt::Debug for IntrospectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionCache")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

