//! The managed-service seam.
//!
//! [`ManagedService`] is the raw request/response surface of the cloud
//! control plane. Implementations make one remote call per method and return
//! the service's error untouched; the [`crate::Driver`] adds ordering,
//! polling and the stage-tagged error taxonomy.

use anyhow::Result;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::Path};

/// Production variant name used for the single model behind an endpoint.
pub const VARIANT_NAME: &str = "AllTraffic";

/// Raw control-plane and runtime calls.
pub trait ManagedService {
    /// Upload a local file to object storage.
    fn upload(
        &self,
        file: &Path,
        location: &StorageLocation,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create a model resource.
    fn create_model(&self, spec: &ModelSpec) -> impl Future<Output = Result<()>> + Send;

    /// Create an endpoint configuration.
    fn create_endpoint_config(
        &self,
        spec: &EndpointConfigSpec,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Start creating an endpoint. Returns once the request is accepted.
    fn create_endpoint(
        &self,
        name: &str,
        config_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the current endpoint status.
    fn describe_endpoint(&self, name: &str)
    -> impl Future<Output = Result<EndpointStatus>> + Send;

    /// Send a JSON request body to a ready endpoint and return the response body.
    fn invoke_endpoint(
        &self,
        name: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Delete an endpoint.
    fn delete_endpoint(&self, name: &str) -> impl Future<Output = Result<Deletion>> + Send;

    /// Delete an endpoint configuration.
    fn delete_endpoint_config(&self, name: &str)
    -> impl Future<Output = Result<Deletion>> + Send;
}

/// Outcome of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The resource existed and was deleted.
    Deleted,
    /// The resource was already gone.
    Missing,
}

/// An object in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub key: String,
}

impl StorageLocation {
    /// `s3://<bucket>/<key>`.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Request to create a model resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    /// Serving runtime container image.
    pub image: String,
    /// The uploaded bundle archive.
    pub model_data: StorageLocation,
    pub role_arn: String,
    /// Container environment.
    pub environment: BTreeMap<String, String>,
}

/// Instance settings for an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSpec {
    /// Instance type, e.g. `ml.g5.12xlarge`.
    pub instance_type: String,
    pub instance_count: u32,
    /// Seconds the container may take to pass its first health check.
    pub health_check_timeout: u32,
    /// Seconds allowed to download the bundle onto the instance.
    pub download_timeout: u32,
}

impl Default for HardwareSpec {
    fn default() -> Self {
        Self {
            instance_type: "ml.g5.12xlarge".to_owned(),
            instance_count: 1,
            health_check_timeout: 900,
            download_timeout: 900,
        }
    }
}

/// Request to create an endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfigSpec {
    pub name: String,
    /// Model resource served by the single production variant.
    pub model: String,
    pub variant: String,
    pub hardware: HardwareSpec,
}

/// A registered model resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub name: CompactString,
    pub model_data: StorageLocation,
}

/// An endpoint and the configuration it was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    pub name: CompactString,
    pub config_name: CompactString,
}

impl EndpointHandle {
    /// Handle for an endpoint whose configuration shares its name, the
    /// convention [`crate::Driver::provision_endpoint`] follows.
    pub fn new(name: impl Into<CompactString>) -> Self {
        let name = name.into();
        Self {
            config_name: name.clone(),
            name,
        }
    }
}

/// Endpoint status as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStatus {
    Creating,
    Updating,
    SystemUpdating,
    RollingBack,
    /// Ready to serve (`InService`).
    Ready,
    OutOfService,
    Deleting,
    /// Provisioning failed, with the service's failure reason.
    Failed { reason: String },
    /// A status this crate does not know.
    Other(String),
}

impl EndpointStatus {
    /// Map a raw status string and optional failure reason.
    pub fn parse(status: &str, failure_reason: Option<&str>) -> Self {
        match status {
            "Creating" => Self::Creating,
            "Updating" => Self::Updating,
            "SystemUpdating" => Self::SystemUpdating,
            "RollingBack" => Self::RollingBack,
            "InService" => Self::Ready,
            "OutOfService" => Self::OutOfService,
            "Deleting" => Self::Deleting,
            "Failed" => Self::Failed {
                reason: failure_reason.unwrap_or("no failure reason given").to_owned(),
            },
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether polling stops at this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed { .. })
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => f.write_str("Creating"),
            Self::Updating => f.write_str("Updating"),
            Self::SystemUpdating => f.write_str("SystemUpdating"),
            Self::RollingBack => f.write_str("RollingBack"),
            Self::Ready => f.write_str("InService"),
            Self::OutOfService => f.write_str("OutOfService"),
            Self::Deleting => f.write_str("Deleting"),
            Self::Failed { .. } => f.write_str("Failed"),
            Self::Other(status) => f.write_str(status),
        }
    }
}
