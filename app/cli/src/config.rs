//! Deployment configuration.
//!
//! Resolves the deployment file in priority order:
//! 1. `--config <path>` flag (explicit override)
//! 2. `./loradeploy.toml` (project config)
//! 3. `~/.config/loradeploy/deploy.toml` (global default)
//!
//! `${VAR}` patterns are expanded from the environment before parsing.

use anyhow::{Context as _, Result, bail};
use bundle::ServingOptions;
use endpoint::{Context, HardwareSpec, PollPolicy};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// Project-local config file name.
pub const PROJECT_CONFIG: &str = "loradeploy.toml";

/// Template written by `loradeploy config init`.
pub const DEFAULT_CONFIG: &str = r#"# loradeploy deployment file.

[context]
region = "us-east-1"
role_arn = "${SAGEMAKER_ROLE_ARN}"
bucket = "${SAGEMAKER_BUCKET}"
prefix = "lora-multi-adapter"

[bundle]
root = "lora-multi-adapter"
base_model = "huggyllama/llama-7b"

[bundle.serving]
rolling_batch = "lmi-dist"
tensor_parallel_degree = "max"
max_loras = 2

[[bundle.adapters]]
name = "eng_alpaca"
source = "tloen/alpaca-lora-7b"

[[bundle.adapters]]
name = "portuguese_alpaca"
source = "22h/cabrita-lora-v0-1"

[endpoint]
image = "763104351884.dkr.ecr.us-east-1.amazonaws.com/djl-inference:0.26.0-deepspeed0.12.6-cu121"
instance_type = "ml.g5.12xlarge"
instance_count = 1
health_check_timeout = 900
download_timeout = 900
poll_interval = 60
"#;

/// Top-level deployment file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Account, region and naming.
    pub context: Context,
    /// Bundle assembly.
    #[serde(default)]
    pub bundle: BundleConfig,
    /// Endpoint settings.
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl DeployConfig {
    /// Parse a TOML string, expanding `${VAR}` first.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    /// Load from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// `[bundle]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Bundle root directory.
    pub root: PathBuf,
    /// Archive path. Defaults to `<root>.tar.gz`.
    pub archive: Option<PathBuf>,
    /// Base model identifier resolved by the serving runtime.
    pub base_model: Option<String>,
    /// Local base weights to embed instead of `base_model`.
    pub base_model_path: Option<PathBuf>,
    /// `serving.properties` options.
    pub serving: ServingOptions,
    /// Adapters to fetch, in order.
    pub adapters: Vec<AdapterEntry>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("lora-multi-adapter"),
            archive: None,
            base_model: None,
            base_model_path: None,
            serving: ServingOptions::default(),
            adapters: Vec::new(),
        }
    }
}

impl BundleConfig {
    /// Where the archive is written.
    pub fn archive_path(&self) -> PathBuf {
        self.archive.clone().unwrap_or_else(|| {
            let mut name = self.root.as_os_str().to_owned();
            name.push(".tar.gz");
            PathBuf::from(name)
        })
    }
}

/// One `[[bundle.adapters]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterEntry {
    /// Name inside the bundle, used in the `adapters` request field.
    pub name: String,
    /// Hub repository or local directory.
    pub source: String,
}

/// `[endpoint]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Serving runtime container image.
    pub image: String,
    #[serde(flatten)]
    pub hardware: HardwareSpec,
    /// Seconds between status polls.
    pub poll_interval: u64,
    /// Seconds to wait for the endpoint before giving up.
    pub max_wait: Option<u64>,
    /// Container environment.
    pub environment: BTreeMap<String, String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            hardware: HardwareSpec::default(),
            poll_interval: 30,
            max_wait: None,
            environment: BTreeMap::new(),
        }
    }
}

impl EndpointConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval),
            max_wait: self.max_wait.map(Duration::from_secs),
        }
    }
}

/// Find the config file following the priority chain.
pub fn resolve_config_path(config_flag: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = config_flag {
        return Some(path.to_path_buf());
    }
    let project = PathBuf::from(PROJECT_CONFIG);
    if project.exists() {
        return Some(project);
    }
    let global = global_config_path();
    global.exists().then_some(global)
}

/// Resolve and load the deployment file.
pub fn resolve_config(config_flag: Option<&Path>) -> Result<(PathBuf, DeployConfig)> {
    let Some(path) = resolve_config_path(config_flag) else {
        bail!(
            "no deployment file found (looked for ./{PROJECT_CONFIG} and {}); run `loradeploy config init`",
            global_config_path().display()
        );
    };
    let config = DeployConfig::load(&path)?;
    tracing::debug!("loaded config from {}", path.display());
    Ok((path, config))
}

/// Path to the global default config.
pub fn global_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("loradeploy")
        .join("deploy.toml")
}

/// Write the default template to `path`.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config to {}", path.display()))?;
    Ok(())
}

/// Expand `${VAR}` patterns from the environment. Unset variables expand to
/// an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();
        let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
        if let Ok(value) = std::env::var(&name) {
            result.push_str(&value);
        }
    }

    result
}
