//! In-memory collaborators for exercising the install flow without a
//! Python toolchain or a cron daemon.

use anyhow::Result;
use autoapp_core::AppError;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::scheduler::{default_entry_id, id_matcher, render_entry};
use crate::{
    AppContext, AppRoots, Clock, DistInfoInspector, EnvRequest, EnvironmentInstaller,
    IntrospectionCache, LaunchEnv, MemoryReporter, PartialBuilds, RootTiers, RuntimeDefaults,
    Scheduler, Session, TierPaths,
};

#[derive(Debug, Clone, Default)]
struct FakePackage {
    scripts: Vec<String>,
    group: Vec<(String, String)>,
    requires_runtime: Option<String>,
}

/// Builds environments by writing the files pip would leave behind: one
/// executable per script under `bin/` and a dist-info directory with
/// `entry_points.txt`.
#[derive(Debug, Clone)]
pub struct FakeInstaller {
    packages: Rc<RefCell<BTreeMap<String, FakePackage>>>,
    runtimes: Rc<RefCell<Vec<String>>>,
    created: Rc<RefCell<Vec<String>>>,
}

impl Default for FakeInstaller {
    fn default() -> Self {
        Self {
            packages: Rc::default(),
            runtimes: Rc::new(RefCell::new(vec!["3".to_string(), "3.8".to_string()])),
            created: Rc::default(),
        }
    }
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, name: &str, scripts: &[&str]) -> Self {
        self.packages.borrow_mut().entry(name.to_string()).or_default().scripts =
            scripts.iter().map(|script| script.to_string()).collect();
        self
    }

    /// Declares a companion app entry `app = value` for `name`.
    pub fn with_group_entry(self, name: &str, app: &str, value: &str) -> Self {
        self.packages
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .group
            .push((app.to_string(), value.to_string()));
        self
    }

    pub fn requiring_runtime(self, name: &str, runtime: &str) -> Self {
        self.packages
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .requires_runtime = Some(runtime.to_string());
        self
    }

    pub fn with_runtimes(self, runtimes: &[&str]) -> Self {
        *self.runtimes.borrow_mut() = runtimes.iter().map(|v| v.to_string()).collect();
        self
    }

    /// `name==version (python X)` for every environment built so far.
    pub fn created(&self) -> Vec<String> {
        self.created.borrow().clone()
    }
}

impl EnvironmentInstaller for FakeInstaller {
    fn locate_runtime(&self, runtime_version: &str, _env: &LaunchEnv) -> Option<PathBuf> {
        self.runtimes
            .borrow()
            .iter()
            .any(|known| known == runtime_version)
            .then(|| PathBuf::from(format!("/usr/bin/python{runtime_version}")))
    }

    fn create(&self, request: &EnvRequest<'_>) -> Result<()> {
        let requirement = format!("{}=={}", request.package, request.version);
        let packages = self.packages.borrow();
        let Some(package) = packages.get(request.package) else {
            return Err(AppError::InstallToolFailure {
                message: format!("pip install {requirement} failed (exit status: 1)"),
                output: format!("ERROR: No matching distribution found for {requirement}"),
            }
            .into());
        };
        if let Some(required) = &package.requires_runtime {
            if required != request.runtime_version {
                return Err(AppError::InstallToolFailure {
                    message: format!("pip install {requirement} failed (exit status: 1)"),
                    output: format!(
                        "ERROR: Package '{}' requires a different Python: {} not in '=={required}'",
                        request.package, request.runtime_version
                    ),
                }
                .into());
            }
        }

        write_environment(request.target, request.package, request.version, package)?;
        self.created.borrow_mut().push(format!(
            "{requirement} (python {})",
            request.runtime_version
        ));
        Ok(())
    }
}

fn write_environment(
    target: &Path,
    name: &str,
    version: &str,
    package: &FakePackage,
) -> Result<()> {
    let bin = target.join("bin");
    fs::create_dir_all(&bin)?;
    for script in &package.scripts {
        fs::write(bin.join(script), "#!/bin/sh\n")?;
    }

    let dist_info = target
        .join("lib")
        .join("python3")
        .join("site-packages")
        .join(format!("{}-{version}.dist-info", name.replace('-', "_")));
    fs::create_dir_all(&dist_info)?;

    let mut entry_points = String::from("[console_scripts]\n");
    for script in &package.scripts {
        entry_points.push_str(&format!("{script} = {}:main\n", name.replace('-', "_")));
    }
    if !package.group.is_empty() {
        entry_points.push_str(&format!("\n[{}]\n", crate::GROUP_ENTRY_POINT));
        for (app, value) in &package.group {
            entry_points.push_str(&format!("{app} = {value}\n"));
        }
    }
    fs::write(dist_info.join("entry_points.txt"), entry_points)?;
    Ok(())
}

/// Schedule table kept in memory, using the same id matching as the cron
/// backend. Minutes are rendered as `0`.
#[derive(Debug, Clone, Default)]
pub struct FakeScheduler {
    entries: Rc<RefCell<Vec<String>>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, line: &str) {
        self.entries.borrow_mut().push(line.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }
}

impl Scheduler for FakeScheduler {
    fn add(&self, command: &str, cadence: &str, id: Option<&str>) -> Result<()> {
        let id = id.map_or_else(|| regex::escape(&default_entry_id(command)), str::to_string);
        let matcher = id_matcher(&id)?;
        let mut entries = self.entries.borrow_mut();
        entries.retain(|line| !matcher.is_match(line));
        entries.push(render_entry(cadence, 0, "/usr/bin:/bin", command));
        Ok(())
    }

    fn list(&self, filter: &str) -> Result<Vec<String>> {
        let filter = filter.to_ascii_lowercase();
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|line| line.to_ascii_lowercase().contains(&filter))
            .cloned()
            .collect())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        let matcher = id_matcher(id)?;
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|line| !matcher.is_match(line));
        Ok(entries.len() != before)
    }
}

/// Clock that only moves when told to or when slept on.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Rc<Cell<SystemTime>>,
    sleeps: Rc<Cell<u32>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            now: Rc::new(Cell::new(SystemTime::now())),
            sleeps: Rc::default(),
        }
    }
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }
}

/// A temporary directory holding all three root tiers plus handles on the
/// fake collaborators wired into every context it builds.
pub struct TestBed {
    pub dir: TempDir,
    pub reporter: MemoryReporter,
    pub scheduler: FakeScheduler,
    pub clock: FakeClock,
    pub installer: FakeInstaller,
}

impl TestBed {
    pub fn new(installer: FakeInstaller) -> Self {
        Self {
            dir: tempfile::tempdir().expect("must create temp dir"),
            reporter: MemoryReporter::new(),
            scheduler: FakeScheduler::new(),
            clock: FakeClock::new(),
            installer,
        }
    }

    pub fn tiers(&self) -> RootTiers {
        let tier = |name: &str| {
            let base = self.dir.path().join(name);
            TierPaths::new(base.join("apps"), base.join("bin"), base.join("log"))
        };
        RootTiers {
            system: tier("system"),
            local: tier("local"),
            user: tier("user"),
        }
    }

    /// Context on the system tier.
    pub fn context(&self, interactive: bool) -> AppContext {
        let selection =
            AppRoots::select_with(self.tiers(), |_| true).expect("must create test roots");
        let self_executable = selection.roots.symlink_root.join(autoapp_core::BOOTSTRAP_APP);
        AppContext {
            roots: selection.roots,
            installer: Box::new(self.installer.clone()),
            introspection: IntrospectionCache::new(Box::new(DistInfoInspector)),
            scheduler: Box::new(self.scheduler.clone()),
            clock: Box::new(self.clock.clone()),
            reporter: Box::new(self.reporter.clone()),
            session: Session { interactive },
            runtime: RuntimeDefaults {
                version: "3".to_string(),
                fallback: Some("3.8".to_string()),
            },
            index_url: None,
            self_executable: Some(self_executable),
            builds: PartialBuilds::new(),
        }
    }

    pub fn install_root(&self) -> PathBuf {
        fs::canonicalize(self.dir.path().join("system").join("apps"))
            .expect("install root must exist")
    }

    pub fn symlink_root(&self) -> PathBuf {
        fs::canonicalize(self.dir.path().join("system").join("bin"))
            .expect("symlink root must exist")
    }
}
