use anyhow::{Context, Result};
use autoapp_core::{scrub_credentials, AppError, AppSpec, Request, UpdatePolicy, BOOTSTRAP_APP};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use crate::clock::Clock;
use crate::fs_utils::{canonicalize_lenient, create_symlink, path_present, replace_symlink};
use crate::inspect::{group_requests, IntrospectionCache, PackageInfo};
use crate::launch_env::LaunchEnv;
use crate::partial::{is_complete_build, mark_complete, PartialBuilds};
use crate::report::Reporter;
use crate::roots::AppRoots;
use crate::scheduler::Scheduler;
use crate::settings::{Settings, KEY_APP_SPEC, KEY_RUNTIME_VERSION, KEY_UPDATE};
use crate::tooling::{is_runtime_mismatch, missing_runtime, EnvRequest, EnvironmentInstaller};

pub const NO_ENTRY_POINTS_MESSAGE: &str = "Odd, there are no scripts included in the app, so there is no point installing it.\n  \
     autoapp is for installing apps with scripts. To install libraries, please use pip.\n  \
     If you are the app owner, declare console_scripts entry points in the package metadata.";

const CURRENT_LINK: &str = "current";
const STAGING_LINK_PREFIX: &str = "atomic_symlink_for_";

static LEGACY_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"{BOOTSTRAP_APP} install "(.+?)""#))
        .expect("legacy entry pattern must compile")
});

/// Whether a person is watching. Unattended runs stay quiet when nothing
/// changes and never touch the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub interactive: bool,
}

/// Which command started an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Install,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDefaults {
    pub version: String,
    /// Retried once when the package rejects `version`.
    pub fallback: Option<String>,
}

/// Everything an [`Application`] needs from the outside world.
pub struct AppContext {
    pub roots: AppRoots,
    pub installer: Box<dyn EnvironmentInstaller>,
    pub introspection: IntrospectionCache,
    pub scheduler: Box<dyn Scheduler>,
    pub clock: Box<dyn Clock>,
    pub reporter: Box<dyn Reporter>,
    pub session: Session,
    pub runtime: RuntimeDefaults,
    /// Index handed to the package tooling, credentials included.
    pub index_url: Option<String>,
    /// This tool's own executable, used for the scheduled update command.
    pub self_executable: Option<PathBuf>,
    /// Environments being built, removed if the process is cut short.
    pub builds: PartialBuilds,
}

impl AppContext {
    pub fn info(&self, line: &str) {
        self.reporter.info(line);
    }

    /// Entry id of the single scheduled update command.
    pub fn schedule_id(&self) -> String {
        format!("{BOOTSTRAP_APP} update")
    }

    pub fn remove_schedule(&self) {
        if let Err(err) = self.scheduler.remove(&self.schedule_id()) {
            tracing::debug!("failed to remove scheduled update: {err:#}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstallPlan<'p> {
    pub spec: &'p AppSpec,
    pub version: &'p str,
    pub policy: Option<UpdatePolicy>,
    pub runtime_version: Option<&'p str>,
    pub trigger: Trigger,
}

/// One managed app under the install root:
/// `<root>/<name>/<version>/` environments, a `current` link to the active
/// one and a `settings.json`.
pub struct Application<'a> {
    ctx: &'a AppContext,
    name: String,
    path: PathBuf,
    current_link: PathBuf,
}

/// Installed apps under the active install root, sorted by name.
pub fn installed_apps(ctx: &AppContext) -> Result<Vec<Application<'_>>> {
    let root = &ctx.roots.install_root;
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", root.display()));
        }
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| Application::new(name, ctx))
        .filter(|app| app.is_installed())
        .collect())
}

impl<'a> Application<'a> {
    pub fn new(name: impl Into<String>, ctx: &'a AppContext) -> Self {
        let name = name.into();
        let path = ctx.roots.install_root.join(&name);
        let current_link = path.join(CURRENT_LINK);
        Self {
            ctx,
            name,
            path,
            current_link,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_link(&self) -> &Path {
        &self.current_link
    }

    pub fn is_installed(&self) -> bool {
        self.current_link.exists()
    }

    pub fn current_version_path(&self) -> Option<PathBuf> {
        if !self.is_installed() {
            return None;
        }
        fs::canonicalize(&self.current_link).ok()
    }

    pub fn current_version(&self) -> Option<String> {
        self.current_version_path()?
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn settings(&self) -> Settings {
        Settings::load(&self.path)
    }

    /// Applies `patch` to the stored settings; writes only on difference.
    pub fn merge_settings(&self, patch: &[(&str, Value)]) -> Result<bool> {
        if !self.path.is_dir() {
            return Ok(false);
        }
        let settings = self.settings();
        let merged = settings.merged(patch);
        if merged == settings {
            return Ok(false);
        }
        merged.write(&self.path)?;
        Ok(true)
    }

    fn info_at(&self, env_path: &Path) -> PackageInfo {
        self.ctx.introspection.info(&self.name, env_path)
    }

    fn current_info(&self) -> PackageInfo {
        if !self.is_installed() {
            return PackageInfo::default();
        }
        self.info_at(&self.current_link)
    }

    /// Console scripts of the active version.
    pub fn scripts(&self) -> BTreeSet<String> {
        self.current_info().scripts
    }

    /// Companion apps declared by the active version, as install requests.
    pub fn group_requests(&self) -> Vec<Request> {
        group_requests(&self.current_info().group_entries)
    }

    pub fn group_names(&self) -> Vec<String> {
        self.current_info()
            .group_entries
            .into_iter()
            .map(|entry| entry.app)
            .collect()
    }

    /// True while the last check is younger than one `policy` interval.
    pub fn is_fresh(&self, policy: UpdatePolicy, now: SystemTime) -> bool {
        let Ok(modified) = fs::metadata(&self.path).and_then(|meta| meta.modified()) else {
            return false;
        };
        modified + policy.interval() >= now
    }

    /// Records a check at `when` on the app directory's mtime.
    pub fn touch(&self, when: SystemTime) -> Result<()> {
        fs::File::open(&self.path)
            .and_then(|dir| dir.set_modified(when))
            .with_context(|| format!("failed to update timestamp of {}", self.path.display()))
    }

    /// Id of the per-app entry older releases scheduled.
    pub fn legacy_schedule_id(&self) -> String {
        format!(
            r#"{BOOTSTRAP_APP} install "{}[^a-z]*""#,
            regex::escape(&self.name)
        )
    }

    /// Installs (or re-activates) `plan.version` and reconciles settings,
    /// schedule and script links. Returns whether anything was mutated.
    pub fn install(&self, plan: &InstallPlan<'_>) -> Result<bool> {
        let reporter = &self.ctx.reporter;
        let version_path = self.path.join(plan.version);
        let previous = self.current_version_path();
        let settings = self.settings();
        let unattended = !self.ctx.session.interactive;

        let mut runtime = plan
            .runtime_version
            .or(settings.runtime_version())
            .unwrap_or(self.ctx.runtime.version.as_str())
            .to_string();
        let policy = plan.policy.or(settings.update_policy());
        let mut changed = false;

        let is_current = previous.as_deref() == Some(version_path.as_path());
        let reusable = version_path.is_dir() && (is_current || is_complete_build(&version_path));
        if version_path.is_dir() && !reusable {
            tracing::debug!("discarding unfinished build in {}", version_path.display());
            fs::remove_dir_all(&version_path)
                .with_context(|| format!("failed to remove {}", version_path.display()))?;
        }

        if reusable {
            if self.current_version().as_deref() == Some(plan.version) {
                if unattended {
                    return Ok(false);
                }
                let label = plan.spec.pin_label();
                let per_spec = if label.is_empty() {
                    String::new()
                } else {
                    format!(" [per spec: {label}]")
                };
                reporter.info(&format!("{} is up-to-date{per_spec}", self.name));
            } else {
                reporter.info(&format!(
                    "{} {} was previously installed and will be set as the current version",
                    self.name, plan.version
                ));
            }
        } else {
            runtime = self.build_environment(&version_path, plan.version, &runtime)?;
            changed = true;
        }

        changed |= self.switch_current(&version_path, previous.as_deref())?;

        let scripts = self.scripts();
        if scripts.is_empty() && self.group_requests().is_empty() {
            self.uninstall()?;
            return Err(AppError::InvalidAction(NO_ENTRY_POINTS_MESSAGE.to_string()).into());
        }

        changed |= self.merge_settings(&[
            (KEY_APP_SPEC, Value::from(plan.spec.to_string())),
            (KEY_RUNTIME_VERSION, Value::from(runtime)),
        ])?;

        if !unattended && plan.trigger == Trigger::Install {
            changed |= self.reconcile_schedule(plan.spec, policy);
        }

        let previous_scripts = previous
            .as_deref()
            .map(|path| self.info_at(path).scripts)
            .unwrap_or_default();
        changed |= self.reconcile_scripts(&scripts, &previous_scripts)?;

        if let Some(previous) = previous.filter(|path| *path != version_path) {
            remove_dir_logged(&previous);
        }

        if changed && !unattended {
            tracing::debug!(
                "Scripts are in {}",
                self.ctx.roots.symlink_root.display()
            );
        }
        Ok(changed)
    }

    fn build_environment(&self, version_path: &Path, version: &str, runtime: &str) -> Result<String> {
        let env = LaunchEnv::capture();
        let installer = &self.ctx.installer;
        if installer.locate_runtime(runtime, &env).is_none() {
            return Err(missing_runtime(runtime).into());
        }

        self.ctx.info(&format!(
            "Installing {} to {}",
            self.name,
            version_path.display()
        ));
        let err = match self.run_installer(version_path, version, runtime, &env) {
            Ok(()) => return Ok(runtime.to_string()),
            Err(err) => err,
        };

        let fallback = self
            .ctx
            .runtime
            .fallback
            .as_deref()
            .filter(|fallback| *fallback != runtime)
            .filter(|_| is_runtime_mismatch(&tool_output(&err)))
            .filter(|fallback| installer.locate_runtime(fallback, &env).is_some());
        let Some(fallback) = fallback else {
            self.report_tool_failure(&err, runtime);
            return Err(err);
        };

        self.ctx.info(&format!(
            "{} requires a different Python version, retrying with Python {fallback}",
            self.name
        ));
        match self.run_installer(version_path, version, fallback, &env) {
            Ok(()) => Ok(fallback.to_string()),
            Err(retry_err) => {
                self.report_tool_failure(&retry_err, fallback);
                Err(retry_err)
            }
        }
    }

    fn run_installer(
        &self,
        version_path: &Path,
        version: &str,
        runtime: &str,
        env: &LaunchEnv,
    ) -> Result<()> {
        let partial = if self.is_installed() {
            version_path
        } else {
            self.path.as_path()
        };
        let _guard = self.ctx.builds.track(partial);
        fs::create_dir_all(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;

        let result = self
            .ctx
            .installer
            .create(&EnvRequest {
                target: version_path,
                runtime_version: runtime,
                package: &self.name,
                version,
                index_url: self.ctx.index_url.as_deref(),
                env,
            })
            .and_then(|()| {
                mark_complete(version_path)
                    .with_context(|| format!("failed to finish {}", version_path.display()))
            });

        if result.is_err() {
            remove_dir_logged(partial);
        }
        result
    }

    fn report_tool_failure(&self, err: &anyhow::Error, runtime: &str) {
        let output = tool_output(err);
        for line in scrub_credentials(&output).lines() {
            self.ctx.info(line);
        }
        self.ctx.reporter.error(&format!(
            "Failed to install using Python {runtime}. If this app requires a different \
             Python version, please specify it using --runtime-version option."
        ));
    }

    fn switch_current(&self, version_path: &Path, previous: Option<&Path>) -> Result<bool> {
        if previous == Some(version_path) {
            return Ok(false);
        }

        let staging = self
            .path
            .join(format!("{STAGING_LINK_PREFIX}{}", self.name));
        replace_symlink(version_path, &self.current_link, &staging)?;

        let keep: Vec<&Path> = std::iter::once(version_path).chain(previous).collect();
        self.prune_versions(&keep);
        Ok(true)
    }

    fn prune_versions(&self, keep: &[&Path]) {
        let Ok(entries) = fs::read_dir(&self.path) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            if is_dir && !keep.iter().any(|kept| *kept == path) {
                remove_dir_logged(&path);
            }
        }
    }

    fn reconcile_schedule(&self, spec: &AppSpec, policy: Option<UpdatePolicy>) -> bool {
        let enabled = self.settings().update_policy();

        if spec.is_pinned() {
            if enabled.is_none() && policy.is_none() {
                return false;
            }
            self.ctx
                .info("Auto-update will be disabled since we are pinning to a specific version.");
            self.ctx
                .info("To enable, re-run without pinning to specific version with --update option");
            if enabled.is_none() {
                return false;
            }
            let changed = self
                .merge_settings(&[(KEY_UPDATE, Value::Null)])
                .unwrap_or_else(|err| {
                    tracing::debug!("{err:#}");
                    false
                });
            self.release_schedule();
            return changed;
        }

        let Some(policy) = policy else {
            return false;
        };
        match self.ensure_schedule(policy, enabled) {
            Ok(changed) => changed,
            Err(err) => {
                self.ctx
                    .reporter
                    .error(&format!("Auto-update was not enabled because: {err}"));
                false
            }
        }
    }

    fn ensure_schedule(&self, policy: UpdatePolicy, enabled: Option<UpdatePolicy>) -> Result<bool> {
        let executable = self.ctx.self_executable.as_deref().ok_or_else(|| {
            AppError::MissingCollaborator(format!(
                "{BOOTSTRAP_APP} is not available. Please make sure its bin folder is in PATH env var"
            ))
        })?;

        let scheduler = &self.ctx.scheduler;
        let schedule_id = self.ctx.schedule_id();
        let existing = scheduler.list(BOOTSTRAP_APP)?;
        let scheduled = existing.iter().any(|line| line.contains(&schedule_id));
        if scheduled && enabled == Some(policy) {
            return Ok(false);
        }

        self.migrate_legacy_entries(&existing);

        let cadence = self.most_frequent_policy(policy).cadence();
        let command = format!(
            "{} update 2>&1 >> {}",
            executable.display(),
            self.ctx.roots.log_root.join("cron.log").display()
        );
        scheduler.add(&command, cadence, Some(&schedule_id))?;
        self.merge_settings(&[(KEY_UPDATE, Value::from(policy.as_str()))])?;
        self.ctx
            .info(&format!("{} auto-update enabled via cron service", policy.title()));
        Ok(true)
    }

    fn most_frequent_policy(&self, policy: UpdatePolicy) -> UpdatePolicy {
        let others = installed_apps(self.ctx).unwrap_or_default();
        others
            .iter()
            .filter(|app| app.name != self.name)
            .filter_map(|app| app.settings().update_policy())
            .chain(std::iter::once(policy))
            .min()
            .unwrap_or(policy)
    }

    // Older releases scheduled one `install "<spec>"` entry per app.
    fn migrate_legacy_entries(&self, existing: &[String]) {
        let mut migrated = false;
        for line in existing {
            let Some(captures) = LEGACY_ENTRY.captures(line) else {
                continue;
            };
            migrated = true;
            let spec = match AppSpec::parse(&captures[1]) {
                Ok(spec) => spec,
                Err(err) => {
                    tracing::debug!("skipping legacy entry {line:?}: {err}");
                    continue;
                }
            };

            let app = Application::new(spec.name.clone(), self.ctx);
            if !app.is_installed() {
                continue;
            }
            let mut patch = vec![(KEY_APP_SPEC, Value::from(spec.to_string()))];
            if let Some(policy) = policy_for_entry(line) {
                patch.push((KEY_UPDATE, Value::from(policy.as_str())));
            }
            if let Err(err) = app.merge_settings(&patch) {
                tracing::debug!("{err:#}");
            }
        }

        if migrated {
            if let Err(err) = self.ctx.scheduler.remove(&format!("{BOOTSTRAP_APP} install")) {
                tracing::debug!("failed to remove legacy entries: {err:#}");
            }
        }
    }

    fn release_schedule(&self) {
        if let Err(err) = self.ctx.scheduler.remove(&self.legacy_schedule_id()) {
            tracing::debug!("failed to remove legacy entry: {err:#}");
        }

        let still_needed = installed_apps(self.ctx)
            .unwrap_or_default()
            .iter()
            .any(|app| app.name != self.name && app.settings().update_policy().is_some());
        if !still_needed {
            self.ctx.remove_schedule();
        }
    }

    fn reconcile_scripts(
        &self,
        scripts: &BTreeSet<String>,
        previous_scripts: &BTreeSet<String>,
    ) -> Result<bool> {
        let roots = &self.ctx.roots;
        let symlink_root = &roots.symlink_root;
        let app_root = canonicalize_lenient(&self.path);
        let mut announced = false;
        let mut changed = false;

        for script in scripts {
            let link = symlink_root.join(script);
            let target = self.current_link.join("bin").join(script);
            let present = path_present(&link);
            if present && canonicalize_lenient(&link) == canonicalize_lenient(&target) {
                continue;
            }

            if !announced {
                self.ctx.info(&format!(
                    "Updating script symlinks in {}",
                    symlink_root.display()
                ));
                announced = true;
            }

            if !present {
                create_symlink(&target, &link)?;
                self.ctx.info(&format!("+ {script}"));
                changed = true;
            } else if roots.covers(&link) || self.name == BOOTSTRAP_APP {
                let staging = symlink_root.join(format!("{STAGING_LINK_PREFIX}{}", self.name));
                replace_symlink(&target, &link, &staging)?;
                self.ctx.info(&format!("* {script} (updated)"));
                changed = true;
            } else {
                self.ctx.info(&format!(
                    "! {script} (can not change / not managed by {BOOTSTRAP_APP})"
                ));
            }
        }

        for script in previous_scripts.difference(scripts) {
            let link = symlink_root.join(script);
            if path_present(&link) && canonicalize_lenient(&link).starts_with(&app_root) {
                fs::remove_file(&link)
                    .with_context(|| format!("failed to remove {}", link.display()))?;
                self.ctx.info(&format!("- Removed {script}"));
                changed = true;
            }
        }

        Ok(changed)
    }

    /// Removes script links owned by this app, its directory and its legacy
    /// scheduled entry.
    pub fn uninstall(&self) -> Result<()> {
        self.ctx.info(&format!("Uninstalling {}", self.name));

        if let Err(err) = self.ctx.scheduler.remove(&self.legacy_schedule_id()) {
            tracing::debug!("failed to remove legacy entry: {err:#}");
        }

        let app_root = canonicalize_lenient(&self.path);
        for script in self.scripts() {
            let link = self.ctx.roots.symlink_root.join(&script);
            if path_present(&link) && canonicalize_lenient(&link).starts_with(&app_root) {
                fs::remove_file(&link)
                    .with_context(|| format!("failed to remove {}", link.display()))?;
            }
        }

        if path_present(&self.path) {
            fs::remove_dir_all(&self.path)
                .with_context(|| format!("failed to remove {}", self.path.display()))?;
        }
        self.ctx.introspection.forget(&self.name);
        Ok(())
    }
}

fn tool_output(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AppError>() {
        Some(AppError::InstallToolFailure { output, .. }) => output.clone(),
        _ => String::new(),
    }
}

/// Maps a legacy entry's cadence back to its policy; the minute is ignored.
fn policy_for_entry(line: &str) -> Option<UpdatePolicy> {
    UpdatePolicy::ALL.into_iter().find(|policy| {
        policy
            .cadence()
            .split_whitespace()
            .skip(1)
            .eq(line.split_whitespace().skip(1).take(4))
    })
}

fn remove_dir_logged(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        tracing::debug!("failed to remove {}: {err}", path.display());
    }
}
