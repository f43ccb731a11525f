//! Bundle archive (`.tar.gz`) packing and listing.

use crate::{ADAPTERS_DIR, Error, Result};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::{
    collections::BTreeSet,
    fs::File,
    path::{Component, Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

/// A packed bundle on local storage.
///
/// Entry names are relative to the bundle root, use `/` separators, and end
/// with `/` for directories.
#[derive(Debug, Clone)]
pub struct BundleArchive {
    path: PathBuf,
    entries: Vec<String>,
}

impl BundleArchive {
    /// Pack `root` into a gzip-compressed tar at `dest`.
    ///
    /// Hidden files and directories (editor and notebook checkpoint state) are
    /// skipped, as is `dest` itself when it lives under `root`. Entries are
    /// added in file-name order.
    pub fn pack(root: &Path, dest: &Path) -> Result<Self> {
        let dest_abs = std::path::absolute(dest)?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let result = write_archive(root, dest, &dest_abs);
        if result.is_err() {
            let _ = std::fs::remove_file(dest);
        }
        let entries = result?;

        tracing::info!(
            "packed {} entries from {} into {}",
            entries.len(),
            root.display(),
            dest.display()
        );
        Ok(Self {
            path: dest.to_path_buf(),
            entries,
        })
    }

    /// Open an existing archive and read its entry list.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            entries: Self::list(path)?,
        })
    }

    /// List the entry names of an archive.
    pub fn list(path: &Path) -> Result<Vec<String>> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
        let mut names = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let mut name = entry
                .path()?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_owned();
            if entry.header().entry_type().is_dir() && !name.ends_with('/') {
                name.push('/');
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive file name, used as the upload object name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle.tar.gz".to_owned())
    }

    /// All entry names.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether the archive holds an entry with exactly this name.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e == name)
    }

    /// Names of the adapter directories packaged under `adapters/`. Plain
    /// files there are not adapters.
    pub fn adapter_names(&self) -> BTreeSet<String> {
        let prefix = format!("{ADAPTERS_DIR}/");
        self.entries
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once('/').map(|(name, _)| name))
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

fn write_archive(root: &Path, dest: &Path, dest_abs: &Path) -> Result<Vec<String>> {
    let encoder = GzEncoder::new(File::create(dest)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if std::path::absolute(entry.path())? == dest_abs {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::Assembly(format!("{} escapes the bundle root", entry.path().display())))?;
        let name = archive_name(rel)?;

        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
            entries.push(format!("{name}/"));
        } else {
            builder.append_path_with_name(entry.path(), &name)?;
            entries.push(name);
        }
    }

    builder.into_inner()?.finish()?;
    Ok(entries)
}

/// Root-relative, `/`-separated name. Rejects anything but plain components.
fn archive_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(Error::Assembly(format!(
                    "refusing non-relative archive path {}",
                    rel.display()
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or_default()
}
