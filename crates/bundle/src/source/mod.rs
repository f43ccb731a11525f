//! Adapter sources.
//!
//! An [`AdapterSource`] copies every file of one adapter into a destination
//! directory. Errors are returned raw; the bundle wraps them into
//! [`crate::Error::Retrieval`] and never retries.

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use {hub::Hub, local::LocalDir};
pub(crate) use local::copy_tree;

mod hub;
mod local;

/// Something that can deliver the files of an adapter.
pub trait AdapterSource {
    /// Copy every file of the adapter identified by `id` into `dest`.
    ///
    /// `dest` exists and is empty when this is called. Returns the written
    /// file paths relative to `dest`.
    fn fetch(&self, id: &str, dest: &Path) -> impl Future<Output = Result<Vec<PathBuf>>> + Send;
}

/// Where a source identifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A directory on the local filesystem.
    Local(PathBuf),
    /// A Hugging Face Hub model repository.
    Hub {
        /// Repository id, `owner/name`.
        repo: String,
        /// Branch, tag or commit.
        revision: String,
    },
}

impl Locator {
    /// Classify a source identifier.
    ///
    /// - `file://<path>` and existing paths are local directories.
    /// - `hf://<owner>/<name>[@rev]` and bare `<owner>/<name>[@rev]` are Hub
    ///   repositories, `main` when no revision is given.
    /// - anything else is treated as a local path.
    pub fn parse(id: &str) -> Self {
        if let Some(path) = id.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }
        if let Some(repo) = id.strip_prefix("hf://") {
            return Self::hub(repo);
        }
        if Path::new(id).exists() || !looks_like_repo(id) {
            return Self::Local(PathBuf::from(id));
        }
        Self::hub(id)
    }

    fn hub(id: &str) -> Self {
        let (repo, revision) = match id.split_once('@') {
            Some((repo, rev)) if !rev.is_empty() => (repo, rev),
            Some((repo, _)) => (repo, "main"),
            None => (id, "main"),
        };
        Self::Hub {
            repo: repo.trim_matches('/').to_owned(),
            revision: revision.to_owned(),
        }
    }
}

fn looks_like_repo(id: &str) -> bool {
    let id = id.split_once('@').map_or(id, |(repo, _)| repo);
    let mut parts = id.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None)
            if !owner.is_empty()
                && !name.is_empty()
                && !owner.starts_with('.')
                && !id.contains(char::is_whitespace)
    )
}

/// Default source: local directories and Hugging Face Hub repositories.
#[derive(Clone)]
pub struct Resolver {
    hub: Hub,
}

impl Resolver {
    /// Create a resolver that downloads Hub adapters with `hub`.
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

impl AdapterSource for Resolver {
    async fn fetch(&self, id: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        match Locator::parse(id) {
            Locator::Local(path) => {
                let path = path.to_string_lossy().into_owned();
                LocalDir.fetch(&path, dest).await
            }
            Locator::Hub { repo, revision } => self.hub.download(&repo, &revision, dest).await,
        }
    }
}
