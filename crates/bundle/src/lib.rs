//! Multi-adapter model bundle assembly.
//!
//! A bundle is a directory holding one base-model reference, any number of
//! LoRA adapters under `adapters/<name>/`, and a `serving.properties` manifest
//! read by the serving runtime at load time. [`Bundle`] builds that directory
//! and [`BundleArchive`] packs it into a single `.tar.gz` with root-relative
//! paths.
//!
//! Adapters are fetched through the [`AdapterSource`] trait. [`Resolver`]
//! dispatches an identifier to either a local directory copy or a Hugging Face
//! Hub download.

pub use {
    adapter::{AdapterArtifact, AdapterConfig, validate_name},
    archive::BundleArchive,
    bundle::{BaseModel, Bundle},
    error::{Error, Result},
    properties::{Parallelism, ServingOptions, ServingProperties},
    source::{AdapterSource, Hub, LocalDir, Locator, Resolver},
};

mod adapter;
mod archive;
mod bundle;
mod error;
mod properties;
mod source;

/// Subdirectory of the bundle root holding one directory per adapter.
pub const ADAPTERS_DIR: &str = "adapters";

/// Serving manifest file name at the bundle root.
pub const PROPERTIES_FILE: &str = "serving.properties";

/// Subdirectory of the bundle root holding embedded base-model weights.
pub const BASE_DIR: &str = "base";

/// PEFT adapter configuration file name inside an adapter directory.
pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
