use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path_present(path) {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// True for anything at `path`, including a dangling symlink.
pub fn path_present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Canonical form of `path`, tolerating a missing tail: the deepest
/// ancestor that resolves is canonicalized and the rest is appended as is.
/// Dangling symlinks are followed one hop through their stored target.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }

    if let Ok(target) = fs::read_link(path) {
        let target = match path.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target,
        };
        return canonicalize_ancestors(&target);
    }

    canonicalize_ancestors(path)
}

fn canonicalize_ancestors(path: &Path) -> PathBuf {
    let mut tail = Vec::new();
    let mut cursor = path;
    while let Some(parent) = cursor.parent() {
        if let Some(name) = cursor.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(mut resolved) = fs::canonicalize(parent) {
            for name in tail.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        cursor = parent;
    }
    path.to_path_buf()
}

/// Points `link` at `target` by creating the link under `staging` and
/// renaming it over `link`, so readers never observe a missing link.
pub fn replace_symlink(target: &Path, link: &Path, staging: &Path) -> Result<()> {
    remove_file_if_exists(staging)
        .with_context(|| format!("failed to clear stale link: {}", staging.display()))?;
    create_symlink(target, staging)?;
    fs::rename(staging, link).with_context(|| {
        format!(
            "failed to move link {} into place at {}",
            staging.display(),
            link.display()
        )
    })
}

#[cfg(unix)]
pub(crate) fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "failed to link {} -> {}",
            link.display(),
            target.display()
        )
    })
}

#[cfg(not(unix))]
pub(crate) fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    anyhow::bail!(
        "symlinks are not supported on this platform: {} -> {}",
        link.display(),
        target.display()
    )
}
