use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use anyhow::Result;
use autoapp_core::{AppError, AppSpec, Request, UpdatePolicy, BOOTSTRAP_APP};
use autoapp_installer::{
    canonicalize_lenient, installed_apps, path_present, AppContext, Application, InstallPlan,
    Trigger,
};
use autoapp_registry::PackageIndex;
use autoapp_resolver::{extract_versions, select_highest};

/// Back-off between checks while waiting for a release.
pub(crate) const WAIT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub(crate) struct InstallOptions<'a> {
    pub(crate) policy: Option<UpdatePolicy>,
    pub(crate) runtime_version: Option<&'a str>,
    pub(crate) wait: bool,
    pub(crate) trigger: Trigger,
}

impl InstallOptions<'_> {
    pub(crate) fn update(wait: bool) -> Self {
        Self {
            policy: None,
            runtime_version: None,
            wait,
            trigger: Trigger::Update,
        }
    }
}

enum Step {
    Installed { changed: bool },
    Waiting,
}

/// Drives install, update, list and uninstall across many apps.
pub(crate) struct Manager {
    ctx: AppContext,
    index: Box<dyn PackageIndex>,
}

impl Manager {
    pub(crate) fn new(ctx: AppContext, index: Box<dyn PackageIndex>) -> Self {
        Self { ctx, index }
    }

    /// Installs every request, including companion apps declared along the
    /// way. Individual failures are reported as they happen; any failure
    /// makes the whole call fail with [`AppError::AggregateFailure`].
    pub(crate) fn install(&self, requests: Vec<Request>, options: &InstallOptions<'_>) -> Result<()> {
        if self.ctx.session.interactive && installed_apps(&self.ctx)?.is_empty() {
            for line in self.ctx.roots.install_privilege_hint() {
                self.ctx.info(&line);
            }
        }

        let mut seen: HashSet<String> = requests.iter().filter_map(request_name).collect();
        let mut queue: VecDeque<Request> = requests.into();
        let mut failed = Vec::new();

        while let Some(request) = queue.pop_front() {
            match self.install_one(&request, options) {
                Ok(Step::Waiting) => queue.push_back(request),
                Ok(Step::Installed { changed: false }) => {}
                Ok(Step::Installed { changed: true }) => {
                    let Some(name) = request_name(&request) else {
                        continue;
                    };
                    let dependents: Vec<Request> = Application::new(name, &self.ctx)
                        .group_requests()
                        .into_iter()
                        .filter(|dependent| {
                            request_name(dependent).is_some_and(|name| seen.insert(name))
                        })
                        .collect();
                    if dependents.is_empty() {
                        continue;
                    }
                    let names: Vec<String> =
                        dependents.iter().filter_map(request_name).collect();
                    self.ctx.info(&format!(
                        "This app has defined \"{BOOTSTRAP_APP}\" entry points to install: {}",
                        names.join(", ")
                    ));
                    queue.extend(dependents);
                }
                Err(err) => {
                    self.ctx.reporter.clear_status();
                    report_error(&self.ctx, &err);
                    failed.push(request.spec().to_string());
                }
            }
        }

        if failed.is_empty() {
            return Ok(());
        }
        tracing::debug!("failed to install: {}", failed.join(", "));
        Err(AppError::AggregateFailure.into())
    }

    fn install_one(&self, request: &Request, options: &InstallOptions<'_>) -> Result<Step> {
        let spec = AppSpec::parse(request.spec())?;
        let policy = request.policy(options.policy);
        let app = Application::new(spec.name.clone(), &self.ctx);

        if app.is_installed() {
            let now = self.ctx.clock.now();
            let gate = policy
                .or(app.settings().update_policy())
                .unwrap_or(UpdatePolicy::DEFAULT);
            let gated = !self.ctx.session.interactive && !options.wait;
            if gated && app.is_fresh(gate, now) {
                tracing::debug!("{} was checked within the last {gate} interval", spec.name);
                return Ok(Step::Installed { changed: false });
            }
            if let Err(err) = app.touch(now) {
                tracing::debug!("{err:#}");
            }
        }

        let listing = self.index.listing(&spec.name)?;
        let versions = extract_versions(&spec.name, &listing)?;
        let version = select_highest(&spec, &versions, &self.index.package_url(&spec.name))?;

        if options.wait && app.current_version().as_deref() == Some(version.as_str()) {
            self.ctx.reporter.status(&format!(
                "Waiting for new version of {} to be published...",
                spec.name
            ));
            self.ctx.clock.sleep(WAIT_INTERVAL);
            return Ok(Step::Waiting);
        }
        self.ctx.reporter.clear_status();

        let changed = app.install(&InstallPlan {
            spec: &spec,
            version: &version,
            policy,
            runtime_version: options.runtime_version,
            trigger: options.trigger,
        })?;
        Ok(Step::Installed { changed })
    }

    /// Re-runs the install flow for installed apps using their stored spec.
    pub(crate) fn update(&self, names: &[String], wait: bool) -> Result<()> {
        let apps = installed_apps(&self.ctx)?;
        if apps.is_empty() {
            self.ctx.info("No apps installed yet.");
            if names.is_empty() {
                self.ctx.remove_schedule();
            }
            return Ok(());
        }

        let interactive = self.ctx.session.interactive;
        let targets: Vec<&Application<'_>> = if !names.is_empty() {
            apps.iter()
                .filter(|app| names.iter().any(|name| name == app.name()))
                .collect()
        } else if interactive || wait {
            apps.iter().collect()
        } else {
            apps.iter()
                .filter(|app| app.settings().update_policy().is_some())
                .collect()
        };

        if targets.is_empty() && !names.is_empty() {
            let available: Vec<&str> = apps.iter().map(|app| app.name()).collect();
            self.ctx
                .info(&format!("No apps found matching: {}", names.join(", ")));
            self.ctx
                .info(&format!("Available apps: {}", available.join(", ")));
            return Ok(());
        }

        let mut requests = Vec::new();
        for app in targets {
            let settings = app.settings();
            match (settings.app_spec(), settings.update_policy()) {
                (Some(spec), Some(policy)) => {
                    requests.push(Request::Pinned(spec.to_string(), Some(policy)));
                }
                (Some(spec), None) => requests.push(Request::Named(spec.to_string())),
                (None, _) if interactive || wait => {
                    requests.push(Request::Named(app.name().to_string()));
                }
                (None, _) => tracing::debug!("skipping {}: no stored app spec", app.name()),
            }
        }

        if requests.is_empty() {
            if names.is_empty() {
                self.ctx.remove_schedule();
            }
            return Ok(());
        }
        self.install(requests, &InstallOptions::update(wait))
    }

    /// Prints installed apps as an aligned table.
    pub(crate) fn list(&self, filter: Option<&str>, show_scripts: bool) -> Result<()> {
        let apps: Vec<Application<'_>> = installed_apps(&self.ctx)?
            .into_iter()
            .filter(|app| filter.map_or(true, |filter| app.name().contains(filter)))
            .collect();

        if apps.is_empty() {
            match filter {
                Some(filter) => self.ctx.info(&format!("No apps matching \"{filter}\"")),
                None => {
                    self.ctx.info("No apps are installed yet.");
                    self.print_privilege_hint();
                }
            }
            return Ok(());
        }

        let rows: Vec<ListRow> = apps.iter().map(ListRow::from_app).collect();
        let symlink_root = &self.ctx.roots.symlink_root;
        let prefix = symlink_root.display().to_string();
        for (row, app) in format_list_rows(&rows).into_iter().zip(&apps) {
            self.ctx.info(&row);
            if !show_scripts {
                continue;
            }
            let app_root = canonicalize_lenient(app.path());
            let linked = app.scripts().into_iter().filter(|script| {
                let link = symlink_root.join(script);
                path_present(&link) && canonicalize_lenient(&link).starts_with(&app_root)
            });
            for line in format_script_rows(&prefix, linked) {
                self.ctx.info(&line);
            }
        }
        Ok(())
    }

    /// Uninstalls `names`; the bootstrap app goes last and only once
    /// nothing else is installed.
    pub(crate) fn uninstall(&self, names: &[String]) -> Result<()> {
        let mut queue: VecDeque<String> = names.iter().cloned().collect();
        let mut deferred = false;

        while let Some(name) = queue.pop_front() {
            let app = Application::new(name.clone(), &self.ctx);
            if !app.is_installed() {
                self.ctx.info(&format!("{name} is not installed"));
                continue;
            }

            if name == BOOTSTRAP_APP {
                let others: Vec<String> = installed_apps(&self.ctx)?
                    .iter()
                    .filter(|other| other.name() != BOOTSTRAP_APP)
                    .map(|other| other.name().to_string())
                    .collect();
                if !others.is_empty() {
                    if !deferred && !queue.is_empty() {
                        deferred = true;
                        queue.push_back(name);
                        continue;
                    }
                    return Err(AppError::UninstallBlocked(format!(
                        "{BOOTSTRAP_APP} can not be uninstalled until other apps are uninstalled: {}",
                        others.join(", ")
                    ))
                    .into());
                }
            }

            let dependents: Vec<String> = app
                .group_names()
                .into_iter()
                .filter(|dependent| Application::new(dependent.clone(), &self.ctx).is_installed())
                .filter(|dependent| !queue.contains(dependent))
                .collect();
            app.uninstall()?;

            if !dependents.is_empty() {
                self.ctx.info(&format!(
                    "This app has defined \"{BOOTSTRAP_APP}\" entry points to uninstall: {}",
                    dependents.join(", ")
                ));
                queue.extend(dependents);
            }
        }

        if installed_apps(&self.ctx)?.is_empty() {
            self.ctx.remove_schedule();
        }
        Ok(())
    }

    fn print_privilege_hint(&self) {
        if let Some(hint) = self.ctx.roots.privilege_hint() {
            self.ctx.info(&hint);
        }
    }
}

fn request_name(request: &Request) -> Option<String> {
    AppSpec::parse(request.spec()).ok().map(|spec| spec.name)
}

fn report_error(ctx: &AppContext, err: &anyhow::Error) {
    let message = err.to_string();
    if !message.is_empty() {
        ctx.reporter.error(&message);
    }
    tracing::debug!("{err:?}");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListRow {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) path: String,
    pub(crate) policy: Option<UpdatePolicy>,
}

impl ListRow {
    fn from_app(app: &Application<'_>) -> Self {
        let path = app.current_version_path();
        Self {
            name: app.name().to_string(),
            version: app.current_version().unwrap_or_default(),
            path: path
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
            policy: app.settings().update_policy(),
        }
    }
}

pub(crate) fn format_list_rows(rows: &[ListRow]) -> Vec<String> {
    let name_width = rows.iter().map(|row| row.name.len()).max().unwrap_or(0);
    let version_width = rows.iter().map(|row| row.version.len()).max().unwrap_or(0);
    let path_width = rows.iter().map(|row| row.path.len()).max().unwrap_or(0);

    rows.iter()
        .map(|row| {
            let policy = row
                .policy
                .map(|policy| format!("[updates {policy}]"))
                .unwrap_or_default();
            format!(
                "{:<name_width$}  {:<version_width$}  {:<path_width$}  {policy}",
                row.name, row.version, row.path
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

/// Script paths under an app row; the shared directory prefix is only
/// written out on the first line.
pub(crate) fn format_script_rows(
    symlink_root: &str,
    scripts: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let prefix = format!("{symlink_root}/");
    scripts
        .into_iter()
        .enumerate()
        .map(|(index, script)| {
            if index == 0 {
                format!("  {prefix}{script}")
            } else {
                format!("  {}{script}", " ".repeat(prefix.len()))
            }
        })
        .collect()
}
