use anyhow::{Context, Result};
use autoapp_core::{scrub_credentials, AppError};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::launch_env::LaunchEnv;

/// One isolated environment to build.
#[derive(Debug, Clone, Copy)]
pub struct EnvRequest<'a> {
    pub target: &'a Path,
    pub runtime_version: &'a str,
    pub package: &'a str,
    pub version: &'a str,
    pub index_url: Option<&'a str>,
    pub env: &'a LaunchEnv,
}

/// Creates an isolated environment with one package installed into it.
pub trait EnvironmentInstaller {
    /// Interpreter for `runtime_version`, when one is available.
    fn locate_runtime(&self, runtime_version: &str, env: &LaunchEnv) -> Option<PathBuf>;

    /// Builds `request.target`. Tool failures surface as
    /// [`AppError::InstallToolFailure`] carrying the captured output.
    fn create(&self, request: &EnvRequest<'_>) -> Result<()>;
}

/// Installs into a `python -m venv` environment with pip.
#[derive(Debug, Clone, Copy, Default)]
pub struct VenvInstaller;

impl EnvironmentInstaller for VenvInstaller {
    fn locate_runtime(&self, runtime_version: &str, env: &LaunchEnv) -> Option<PathBuf> {
        env.find_executable(&format!("python{runtime_version}"))
    }

    fn create(&self, request: &EnvRequest<'_>) -> Result<()> {
        let interpreter = self
            .locate_runtime(request.runtime_version, request.env)
            .ok_or_else(|| missing_runtime(request.runtime_version))?;

        let mut venv = request.env.command(&interpreter);
        venv.arg("-m").arg("venv").arg(request.target);
        run_tool(&mut venv, "python -m venv")?;

        let python = request.target.join("bin").join("python");
        let mut upgrade = request.env.command(&python);
        upgrade.args(["-m", "pip", "install", "--upgrade", "pip", "wheel"]);
        run_tool(&mut upgrade, "pip install --upgrade pip wheel")?;

        let requirement = format!("{}=={}", request.package, request.version);
        let mut install = request.env.command(&python);
        install.args(["-m", "pip", "install"]);
        if let Some(index_url) = request.index_url {
            install.arg("--index-url").arg(index_url);
        }
        install.arg(&requirement);
        run_tool(&mut install, &format!("pip install {requirement}"))?;

        trim_environment(request.target, &python, request.env);
        Ok(())
    }
}

pub(crate) fn missing_runtime(runtime_version: &str) -> AppError {
    AppError::MissingCollaborator(format!(
        "python{runtime_version} does not exist. Please install it first, or ensure its path is in PATH."
    ))
}

/// Whether tool output says the package wants another interpreter version.
pub fn is_runtime_mismatch(output: &str) -> bool {
    output.contains("Requires-Python") || output.contains("requires a different Python")
}

fn run_tool(command: &mut Command, step: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{step}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(AppError::InstallToolFailure {
        message: format!("{step} failed ({})", output.status),
        output: scrub_credentials(combined.trim()),
    }
    .into())
}

// Installer-only payload is not needed once the app is in place.
fn trim_environment(target: &Path, python: &Path, env: &LaunchEnv) {
    let wheels = target.join("share").join("python-wheels");
    if wheels.is_dir() {
        if let Err(err) = fs::remove_dir_all(&wheels) {
            tracing::debug!("failed to remove {}: {err}", wheels.display());
        }
    }

    let mut uninstall = env.command(python);
    uninstall.args(["-m", "pip", "uninstall", "--yes", "pip"]);
    if let Err(err) = run_tool(&mut uninstall, "pip uninstall pip") {
        tracing::debug!("{err:#}");
    }
}
