//! Endpoint lifecycle driver.

use crate::{
    Context, Deletion, EndpointConfigSpec, EndpointHandle, EndpointStatus, Error, HardwareSpec,
    InvocationRequest, ManagedService, ModelHandle, ModelSpec, Result, Stage, StorageLocation,
    VARIANT_NAME,
};
use bundle::BundleArchive;
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

/// How [`Driver::await_ready`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed sleep between polls.
    pub interval: Duration,
    /// Give up with [`Error::Timeout`] once this much time has passed.
    /// `None` polls until a terminal status.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_wait: None,
        }
    }
}

/// Drives one bundle through the endpoint lifecycle.
///
/// Operations run strictly in the order the caller issues them. A failure is
/// returned immediately; resources created by earlier steps are left in
/// place.
pub struct Driver<S> {
    service: S,
    context: Context,
    poll: PollPolicy,
    environment: BTreeMap<String, String>,
}

impl<S: ManagedService> Driver<S> {
    /// Create a driver over `service` for the deployment described by `context`.
    pub fn new(service: S, context: Context) -> Self {
        Self {
            service,
            context,
            poll: PollPolicy::default(),
            environment: BTreeMap::new(),
        }
    }

    /// Set the poll policy.
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Set the container environment passed to registered models.
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// The underlying service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// The deployment context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Upload the archive under the context prefix.
    pub async fn publish(&self, archive: &BundleArchive) -> Result<StorageLocation> {
        let location = StorageLocation {
            bucket: self.context.bucket.clone(),
            key: self.context.object_key(&archive.file_name()),
        };
        tracing::info!("uploading {} to {location}", archive.path().display());
        self.service
            .upload(archive.path(), &location)
            .await
            .map_err(|e| Error::Upload {
                archive: archive.path().to_path_buf(),
                uri: location.uri(),
                reason: format!("{e:#}"),
            })?;
        Ok(location)
    }

    /// Register a model serving the archive at `location` with `image`.
    pub async fn register_model(
        &self,
        location: &StorageLocation,
        image: &str,
    ) -> Result<ModelHandle> {
        let name = self.context.resource_name("model");
        if let Err(reason) = check_image(image) {
            return Err(Error::Registration {
                model: name,
                reason: reason.to_owned(),
            });
        }
        if location.bucket.is_empty() || location.key.is_empty() {
            return Err(Error::Registration {
                model: name,
                reason: format!("incomplete model data location {location}"),
            });
        }

        let spec = ModelSpec {
            name: name.clone(),
            image: image.to_owned(),
            model_data: location.clone(),
            role_arn: self.context.role_arn.clone(),
            environment: self.environment.clone(),
        };
        self.service
            .create_model(&spec)
            .await
            .map_err(|e| Error::Registration {
                model: name.clone(),
                reason: format!("{e:#}"),
            })?;
        tracing::info!("registered model {name} from {location}");
        Ok(ModelHandle {
            name: name.into(),
            model_data: location.clone(),
        })
    }

    /// Create an endpoint configuration and start creating the endpoint.
    ///
    /// Both resources share one generated name. Returns as soon as the
    /// service accepts the request; use [`Driver::await_ready`] to wait.
    pub async fn provision_endpoint(
        &self,
        model: &ModelHandle,
        hardware: &HardwareSpec,
    ) -> Result<EndpointHandle> {
        let handle = EndpointHandle::new(self.context.resource_name("endpoint"));
        let failed = |e: anyhow::Error| Error::Provisioning {
            endpoint: handle.name.to_string(),
            reason: format!("{e:#}"),
        };

        let config = EndpointConfigSpec {
            name: handle.config_name.to_string(),
            model: model.name.to_string(),
            variant: VARIANT_NAME.to_owned(),
            hardware: hardware.clone(),
        };
        self.service
            .create_endpoint_config(&config)
            .await
            .map_err(failed)?;
        tracing::info!(
            "created endpoint config {} ({} x {})",
            config.name,
            hardware.instance_count,
            hardware.instance_type
        );

        self.service
            .create_endpoint(&handle.name, &handle.config_name)
            .await
            .map_err(failed)?;
        tracing::info!("creating endpoint {}", handle.name);
        Ok(handle)
    }

    /// Poll until the endpoint is ready.
    ///
    /// Every iteration fetches the status once; non-terminal statuses sleep
    /// for the poll interval. `Failed` becomes [`Error::Provisioning`].
    pub async fn await_ready(&self, endpoint: &EndpointHandle) -> Result<EndpointStatus> {
        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            let status = self
                .service
                .describe_endpoint(&endpoint.name)
                .await
                .map_err(|e| Error::Service {
                    stage: Stage::Polling,
                    reason: format!("{e:#}"),
                })?;
            polls += 1;
            tracing::info!("endpoint {} is {status} (poll {polls})", endpoint.name);

            match status {
                EndpointStatus::Ready => return Ok(status),
                EndpointStatus::Failed { reason } => {
                    return Err(Error::Provisioning {
                        endpoint: endpoint.name.to_string(),
                        reason,
                    });
                }
                _ => {}
            }

            if let Some(max_wait) = self.poll.max_wait {
                let waited = started.elapsed();
                if waited >= max_wait {
                    return Err(Error::Timeout {
                        endpoint: endpoint.name.to_string(),
                        waited,
                        last: status,
                    });
                }
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Send one inference request and return the raw response body.
    ///
    /// The adapter name is passed through unchecked; an unknown name is
    /// reported by the runtime as [`Error::Invocation`].
    pub async fn invoke(
        &self,
        endpoint: &EndpointHandle,
        request: &InvocationRequest,
    ) -> Result<Vec<u8>> {
        let failed = |reason: String| Error::Invocation {
            endpoint: endpoint.name.to_string(),
            adapter: request.adapters.clone(),
            reason,
        };
        let body = serde_json::to_vec(request).map_err(|e| failed(e.to_string()))?;
        tracing::debug!(
            "invoking {} with adapter {:?}",
            endpoint.name,
            request.adapters
        );
        self.service
            .invoke_endpoint(&endpoint.name, body)
            .await
            .map_err(|e| failed(format!("{e:#}")))
    }

    /// Delete the endpoint, then its configuration.
    ///
    /// Resources that are already gone are skipped, so repeating a teardown
    /// succeeds.
    pub async fn teardown(&self, endpoint: &EndpointHandle) -> Result<()> {
        let failed = |e: anyhow::Error| Error::Service {
            stage: Stage::Teardown,
            reason: format!("{e:#}"),
        };

        match self
            .service
            .delete_endpoint(&endpoint.name)
            .await
            .map_err(failed)?
        {
            Deletion::Deleted => tracing::info!("deleted endpoint {}", endpoint.name),
            Deletion::Missing => tracing::info!("endpoint {} already deleted", endpoint.name),
        }
        match self
            .service
            .delete_endpoint_config(&endpoint.config_name)
            .await
            .map_err(failed)?
        {
            Deletion::Deleted => tracing::info!("deleted endpoint config {}", endpoint.config_name),
            Deletion::Missing => {
                tracing::info!("endpoint config {} already deleted", endpoint.config_name)
            }
        }
        Ok(())
    }
}

/// Reject image references that cannot name a container image.
fn check_image(image: &str) -> std::result::Result<(), &'static str> {
    if image.is_empty() {
        return Err("image reference is empty");
    }
    if image.contains(char::is_whitespace) {
        return Err("image reference contains whitespace");
    }
    let last = image.rsplit('/').next().unwrap_or(image);
    if !last.contains([':', '@']) {
        return Err("image reference has no tag or digest");
    }
    Ok(())
}
