use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

const PATH: &str = "PATH";
const PYTHONPATH: &str = "PYTHONPATH";
const VIRTUAL_ENV: &str = "VIRTUAL_ENV";

/// Environment handed to the package tooling: the caller's variables minus
/// anything pointing into an active virtual environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl LaunchEnv {
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let mut vars: BTreeMap<OsString, OsString> = vars.into_iter().collect();
        vars.remove(OsStr::new(PYTHONPATH));

        if let Some(venv) = vars.remove(OsStr::new(VIRTUAL_ENV)) {
            let venv = PathBuf::from(venv);
            if let Some(path) = vars.get(OsStr::new(PATH)) {
                let kept: Vec<PathBuf> = std::env::split_paths(path)
                    .filter(|entry| !entry.starts_with(&venv))
                    .collect();
                if let Ok(joined) = std::env::join_paths(kept) {
                    vars.insert(OsString::from(PATH), joined);
                }
            }
        }

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    /// Looks `binary` up on this environment's PATH.
    pub fn find_executable(&self, binary: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(binary, self.get(PATH), cwd).ok()
    }

    /// Builds a command that sees exactly this environment.
    pub fn command(&self, program: impl AsRef<Path>) -> Command {
        let mut command = Command::new(program.as_ref());
        command.env_clear().envs(&self.vars);
        command
    }
}
