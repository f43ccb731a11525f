//! Adapter artifacts and their PEFT configuration.

use crate::{ADAPTER_CONFIG_FILE, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One fine-tuned adapter relocated into the bundle.
///
/// The files are opaque to this crate. The only file it reads is
/// `adapter_config.json`, and only to learn the adapter rank.
#[derive(Debug, Clone)]
pub struct AdapterArtifact {
    /// Adapter name, unique within the bundle. Also the name clients pass in
    /// the `adapters` request field.
    pub name: String,
    /// Source identifier the adapter was fetched from.
    pub source: String,
    /// Directory of the adapter inside the bundle.
    pub path: PathBuf,
    /// Fetched files, relative to [`AdapterArtifact::path`].
    pub files: Vec<PathBuf>,
    /// Parsed `adapter_config.json`, if the adapter ships one.
    pub config: Option<AdapterConfig>,
}

impl AdapterArtifact {
    /// LoRA rank declared by the adapter configuration.
    pub fn rank(&self) -> Option<usize> {
        self.config.as_ref().map(|c| c.r)
    }
}

/// PEFT adapter configuration (`adapter_config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// LoRA rank.
    pub r: usize,
    /// Scaling numerator.
    #[serde(default)]
    pub lora_alpha: f32,
    /// Modules the adapter applies to. PEFT writes either a list or a regex.
    #[serde(default)]
    pub target_modules: TargetModules,
    /// Base model the adapter was trained against.
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
    /// PEFT method, `LORA` for the adapters this crate packages.
    #[serde(default)]
    pub peft_type: Option<String>,
}

impl AdapterConfig {
    /// Read `adapter_config.json` from an adapter directory.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(ADAPTER_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// `target_modules` as written by PEFT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetModules {
    /// Explicit module names.
    List(Vec<String>),
    /// A single module name or regex.
    Pattern(String),
}

impl Default for TargetModules {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// Check that `name` can be used as an adapter directory and request value.
///
/// Names must be a single non-empty path component and must not start with
/// `.`, since hidden entries are left out of the archive.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.starts_with('.') {
        "name starts with '.'"
    } else if name.contains(['/', '\\']) {
        "name contains a path separator"
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "name contains whitespace or control characters"
    } else {
        return Ok(());
    };

    Err(Error::InvalidName {
        name: name.to_owned(),
        reason,
    })
}
