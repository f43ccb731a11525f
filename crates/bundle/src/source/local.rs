//! Local directory source.

use super::AdapterSource;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copies an adapter from a directory on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDir;

impl AdapterSource for LocalDir {
    async fn fetch(&self, id: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let src = Path::new(id.strip_prefix("file://").unwrap_or(id));
        if !src.is_dir() {
            bail!("{} is not a directory", src.display());
        }
        let files = copy_tree(src, dest)
            .await
            .with_context(|| format!("copying {}", src.display()))?;
        if files.is_empty() {
            bail!("{} contains no files", src.display());
        }
        Ok(files)
    }
}

/// Copy `src` into `dest` on the blocking pool.
pub(crate) async fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<Vec<PathBuf>> {
    let (src, dest) = (src.to_path_buf(), dest.to_path_buf());
    tokio::task::spawn_blocking(move || copy_tree_blocking(&src, &dest))
        .await
        .map_err(std::io::Error::other)?
}

/// Recursively copy the regular files under `src` into `dest`.
///
/// Hidden entries are skipped. Returns the copied paths relative to `dest`.
fn copy_tree_blocking(src: &Path, dest: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(src)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?
            .to_path_buf();
        let target = dest.join(&rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)?;
        files.push(rel);
    }

    Ok(files)
}
