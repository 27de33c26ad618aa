use std::path::{Path, PathBuf};

use anyhow::Result;
use autoapp_core::{Request, BOOTSTRAP_APP};
use autoapp_installer::{
    AppContext, AppRoots, Crontab, DistInfoInspector, IntrospectionCache, PartialBuilds,
    RootTiers, RuntimeDefaults, Session, SystemClock, Trigger, VenvInstaller,
};
use autoapp_registry::{discover_index, HttpIndex, IndexConfig};

use crate::completion::write_completions_script;
use crate::config::Config;
use crate::manager::{InstallOptions, Manager};
use crate::render::{OutputStyle, TerminalRenderer};
use crate::{Cli, Commands};

const BASE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

pub(crate) fn run_cli(cli: Cli, builds: PartialBuilds) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        return write_completions_script(shell, &mut std::io::stdout());
    }

    let home = std::env::var_os("HOME").map(PathBuf::from);
    let config = Config::load(home.as_deref())?;
    let manager = build_manager(&config, home.as_deref(), builds)?;

    match cli.command {
        Commands::Install {
            names,
            update,
            runtime_version,
        } => {
            let requests = names.into_iter().map(Request::Named).collect();
            manager.install(
                requests,
                &InstallOptions {
                    policy: Some(update),
                    runtime_version: runtime_version.as_deref(),
                    wait: false,
                    trigger: Trigger::Install,
                },
            )
        }
        Commands::List { filter, scripts } => manager.list(filter.as_deref(), scripts),
        Commands::Update { names, wait } => manager.update(&names, wait),
        Commands::Uninstall { names } => manager.uninstall(&names),
        Commands::Completions { .. } => Ok(()),
    }
}

fn build_manager(
    config: &Config,
    home: Option<&Path>,
    builds: PartialBuilds,
) -> Result<Manager> {
    let renderer = TerminalRenderer::current();
    let session = Session {
        interactive: renderer.style() == OutputStyle::Rich,
    };

    let selection = AppRoots::select(config.root_tiers(RootTiers::from_env()?))?;
    for rejection in &selection.rejections {
        tracing::debug!(
            "{} roots not usable: {}",
            rejection.tier,
            rejection.reasons.join(", ")
        );
    }
    let roots = selection.roots;
    tracing::debug!(
        "using {} roots: {} -> {}",
        roots.tier,
        roots.install_root.display(),
        roots.symlink_root.display()
    );

    let index_config = discover_index(home, config.index_url.as_deref());
    let tool_index_url = (index_config != IndexConfig::default())
        .then(|| index_config.authenticated_url());
    let index = HttpIndex::new(index_config)?;

    let self_executable = which::which(BOOTSTRAP_APP).ok();
    let path_env = schedule_path(&roots.symlink_root, self_executable.as_deref());

    let ctx = AppContext {
        roots,
        installer: Box::new(VenvInstaller),
        introspection: IntrospectionCache::new(Box::new(DistInfoInspector)),
        scheduler: Box::new(Crontab::new(path_env)),
        clock: Box::new(SystemClock),
        reporter: Box::new(renderer),
        session,
        runtime: RuntimeDefaults {
            version: config.runtime_version.clone(),
            fallback: config.fallback_runtime_version.clone(),
        },
        index_url: tool_index_url,
        self_executable,
        builds,
    };
    Ok(Manager::new(ctx, Box::new(index)))
}

/// `PATH` for scheduled runs: the symlink root and this executable's
/// directory ahead of the usual system directories.
pub(crate) fn schedule_path(symlink_root: &Path, self_executable: Option<&Path>) -> String {
    let mut entries: Vec<String> = Vec::new();
    let dirs = std::iter::once(symlink_root).chain(self_executable.and_then(Path::parent));
    for dir in dirs {
        let dir = dir.display().to_string();
        if !entries.contains(&dir) {
            entries.push(dir);
        }
    }
    for dir in BASE_PATH.split(':') {
        if !entries.iter().any(|entry| entry == dir) {
            entries.push(dir.to_string());
        }
    }
    entries.join(":")
}
