use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Written into a version directory once its environment is fully built.
pub const BUILD_MARKER: &str = ".autoapp-complete";

/// Version directories whose environment is being built right now.
///
/// Clones share the same list, so an interrupt handler or the run-time
/// watchdog can remove half-built directories before the process exits.
#[derive(Debug, Clone, Default)]
pub struct PartialBuilds {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl PartialBuilds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `path` until the returned guard is dropped.
    pub fn track(&self, path: &Path) -> BuildGuard<'_> {
        self.lock().push(path.to_path_buf());
        BuildGuard {
            builds: self,
            path: path.to_path_buf(),
        }
    }

    /// Directories currently being built.
    pub fn in_progress(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Deletes every tracked directory and returns the ones removed.
    pub fn discard(&self) -> Vec<PathBuf> {
        let paths = std::mem::take(&mut *self.lock());
        paths
            .into_iter()
            .filter(|path| match fs::remove_dir_all(path) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!("failed to remove {}: {err}", path.display());
                    false
                }
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct BuildGuard<'b> {
    builds: &'b PartialBuilds,
    path: PathBuf,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.builds.lock().retain(|path| *path != self.path);
    }
}

/// True when `version_path` holds an environment that finished building.
pub fn is_complete_build(version_path: &Path) -> bool {
    version_path.join(BUILD_MARKER).is_file()
}

pub(crate) fn mark_complete(version_path: &Path) -> std::io::Result<()> {
    fs::write(version_path.join(BUILD_MARKER), "")
}
