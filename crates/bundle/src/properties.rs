//! `serving.properties` rendering and parsing.
//!
//! The manifest is a flat list of `key=value` lines. Core directives are
//! written in a fixed order, followed by any extra `option.*` directives in
//! key order.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub(crate) const ENGINE: &str = "engine";
pub(crate) const MODEL_ID: &str = "option.model_id";
pub(crate) const ROLLING_BATCH: &str = "option.rolling_batch";
pub(crate) const TENSOR_PARALLEL_DEGREE: &str = "option.tensor_parallel_degree";
pub(crate) const ENABLE_LORA: &str = "option.enable_lora";
pub(crate) const MAX_LORAS: &str = "option.max_loras";
pub(crate) const MAX_LORA_RANK: &str = "option.max_lora_rank";

/// Tensor-parallel degree: a fixed number of devices or every visible one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParallelism", into = "RawParallelism")]
pub enum Parallelism {
    /// Shard across exactly this many devices.
    Degree(u32),
    /// Shard across all devices on the host (`max`).
    Max,
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degree(n) => write!(f, "{n}"),
            Self::Max => f.write_str("max"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawParallelism {
    Degree(u32),
    Text(String),
}

impl TryFrom<RawParallelism> for Parallelism {
    type Error = String;

    fn try_from(raw: RawParallelism) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawParallelism::Degree(0) => Err("tensor_parallel_degree must be at least 1".into()),
            RawParallelism::Degree(n) => Ok(Self::Degree(n)),
            RawParallelism::Text(s) if s.eq_ignore_ascii_case("max") => Ok(Self::Max),
            RawParallelism::Text(s) => s
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .map(Self::Degree)
                .ok_or_else(|| format!("expected a positive integer or 'max', got '{s}'")),
        }
    }
}

impl From<Parallelism> for RawParallelism {
    fn from(p: Parallelism) -> Self {
        match p {
            Parallelism::Degree(n) => Self::Degree(n),
            Parallelism::Max => Self::Text("max".into()),
        }
    }
}

/// Caller-supplied serving options.
///
/// `None` fields are left out of the manifest unless the bundle contents
/// require them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingOptions {
    /// Serving engine, `Python` when unset.
    pub engine: Option<String>,
    /// Base model identifier. Filled from the bundle's base model when unset.
    pub model_id: Option<String>,
    /// Batching engine selector, e.g. `lmi-dist` or `vllm`.
    pub rolling_batch: Option<String>,
    /// Tensor-parallel degree.
    pub tensor_parallel_degree: Option<Parallelism>,
    /// Adapter support. Forced on whenever adapters are packaged.
    pub enable_lora: Option<bool>,
    /// Maximum adapters resident at once. Raised to the adapter count when
    /// lower.
    pub max_loras: Option<u32>,
    /// Largest adapter rank the runtime reserves room for.
    pub max_lora_rank: Option<u32>,
    /// Additional directives. Keys without a `.` get an `option.` prefix.
    pub extra: BTreeMap<String, String>,
}

impl ServingOptions {
    /// Bring the options in line with what the bundle packages.
    ///
    /// With at least one adapter, `enable_lora` is forced true and
    /// `max_loras` is at least `adapters`. `max_lora_rank` defaults to the
    /// largest known adapter rank.
    pub fn reconcile(mut self, adapters: usize, max_rank: Option<usize>) -> Self {
        if adapters == 0 {
            return self;
        }

        if self.enable_lora == Some(false) {
            tracing::warn!(
                "enable_lora=false requested but {adapters} adapter(s) are packaged, enabling"
            );
        }
        self.enable_lora = Some(true);

        let count = u32::try_from(adapters).unwrap_or(u32::MAX);
        match self.max_loras {
            Some(max) if max < count => {
                tracing::warn!("max_loras={max} is below the {count} packaged adapters, raising");
                self.max_loras = Some(count);
            }
            Some(_) => {}
            None => self.max_loras = Some(count),
        }

        if self.max_lora_rank.is_none() {
            self.max_lora_rank = max_rank.and_then(|r| u32::try_from(r).ok());
        }
        self
    }

    /// Render the options as an ordered manifest.
    pub fn to_properties(&self) -> ServingProperties {
        let mut props = ServingProperties::default();
        props.set(ENGINE, self.engine.as_deref().unwrap_or("Python"));
        if let Some(id) = &self.model_id {
            props.set(MODEL_ID, id);
        }
        if let Some(batch) = &self.rolling_batch {
            props.set(ROLLING_BATCH, batch);
        }
        if let Some(tp) = self.tensor_parallel_degree {
            props.set(TENSOR_PARALLEL_DEGREE, tp.to_string());
        }
        if let Some(enable) = self.enable_lora {
            props.set(ENABLE_LORA, enable.to_string());
        }
        if let Some(max) = self.max_loras {
            props.set(MAX_LORAS, max.to_string());
        }
        if let Some(rank) = self.max_lora_rank {
            props.set(MAX_LORA_RANK, rank.to_string());
        }

        for (key, value) in &self.extra {
            let key = if key.contains('.') || key == ENGINE {
                key.clone()
            } else {
                format!("option.{key}")
            };
            if props.get(&key).is_some() {
                tracing::warn!("ignoring extra directive {key}, it is managed by the bundle");
                continue;
            }
            props.set(key, value);
        }
        props
    }
}

/// An ordered `key=value` manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServingProperties {
    entries: Vec<(String, String)>,
}

impl ServingProperties {
    /// Parse a manifest. Blank lines and `#` comments are skipped, as are
    /// lines without `=`.
    pub fn parse(text: &str) -> Self {
        let mut props = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                props.set(key.trim(), value.trim());
            }
        }
        props
    }

    /// Set a directive, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a directive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All directives in manifest order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// The base model identifier, if set and non-empty.
    pub fn model_id(&self) -> Option<&str> {
        self.get(MODEL_ID).filter(|id| !id.is_empty())
    }

    /// Whether adapter support is switched on.
    pub fn enable_lora(&self) -> bool {
        self.get(ENABLE_LORA)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// The resident-adapter cap, if set and numeric.
    pub fn max_loras(&self) -> Option<u32> {
        self.get(MAX_LORAS).and_then(|v| v.parse().ok())
    }

    /// Check that every directive renders as exactly one `key=value` line
    /// and reads back unchanged.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.entries {
            if key.is_empty()
                || key.starts_with('#')
                || key.trim() != key
                || key.contains(['=', '\n', '\r'])
            {
                return Err(Error::Assembly(format!("invalid directive name {key:?}")));
            }
            if value.contains(['\n', '\r']) || value.trim() != value {
                return Err(Error::Assembly(format!(
                    "invalid value {value:?} for directive {key}"
                )));
            }
        }
        Ok(())
    }

    /// Render the manifest, one directive per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ServingProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
