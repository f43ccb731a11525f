//! Hugging Face Hub source.
//!
//! Lists the repository files through the model info API and streams each one
//! from the `resolve` endpoint. Authenticates with `HF_TOKEN` when it is set.

use super::{AdapterSource, Locator};
use anyhow::{Result, anyhow, bail};
use futures_util::StreamExt;
use reqwest::{Client, IntoUrl, Url};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Default Hub endpoint.
const HUB_ENDPOINT: &str = "https://huggingface.co";

/// Downloads adapter repositories from the Hugging Face Hub.
#[derive(Clone)]
pub struct Hub {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Deserialize)]
struct Sibling {
    rfilename: String,
}

impl Hub {
    /// Create a Hub source using `HF_TOKEN` from the environment, if any.
    pub fn new(client: Client) -> Self {
        let token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
        Self {
            client,
            endpoint: HUB_ENDPOINT.to_owned(),
            token,
        }
    }

    /// Override the Hub endpoint (mirrors, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
        self
    }

    /// Use an explicit access token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Download every non-hidden file of `repo` at `revision` into `dest`.
    pub async fn download(&self, repo: &str, revision: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let info_url = self.url(
            ["api", "models"]
                .into_iter()
                .chain(repo.split('/'))
                .chain(["revision", revision]),
        )?;
        tracing::debug!("listing {info_url}");
        let info: RepoInfo = self
            .get(info_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut files = Vec::new();
        for sibling in info.siblings {
            let rel = PathBuf::from(&sibling.rfilename);
            if !is_safe_relative(&rel) {
                bail!("refusing repository path '{}'", sibling.rfilename);
            }
            if rel
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            {
                continue;
            }

            let url = self.url(
                repo.split('/')
                    .chain(["resolve", revision])
                    .chain(sibling.rfilename.split('/')),
            )?;
            let target = dest.join(&rel);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let bytes = self.stream_to(url, &target).await?;
            tracing::debug!("downloaded {} ({bytes} bytes)", sibling.rfilename);
            files.push(rel);
        }

        if files.is_empty() {
            bail!("repository {repo}@{revision} has no files");
        }
        Ok(files)
    }

    /// Endpoint URL with `segments` appended, each percent-encoded.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("{} cannot be a base URL", self.endpoint))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn stream_to(&self, url: Url, target: &Path) -> Result<u64> {
        let response = self.get(url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    fn get(&self, url: impl IntoUrl) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl AdapterSource for Hub {
    async fn fetch(&self, id: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        match Locator::parse(id) {
            Locator::Hub { repo, revision } => self.download(&repo, &revision, dest).await,
            Locator::Local(path) => bail!("{} is not a hub repository", path.display()),
        }
    }
}

fn is_safe_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}
