//! SageMaker backend.

use crate::{
    Context, Deletion, EndpointConfigSpec, EndpointStatus, ManagedService, ModelSpec,
    StorageLocation,
};
use anyhow::{Context as _, Result, anyhow};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_sagemaker::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{ContainerDefinition, ProductionVariant, ProductionVariantInstanceType},
};
use aws_sdk_sagemakerruntime::primitives::Blob;
use std::path::Path;

/// Amazon S3, SageMaker and SageMaker Runtime clients sharing one
/// configuration.
#[derive(Clone)]
pub struct SageMaker {
    s3: aws_sdk_s3::Client,
    control: aws_sdk_sagemaker::Client,
    runtime: aws_sdk_sagemakerruntime::Client,
}

impl SageMaker {
    /// Load credentials for the context's region and profile.
    pub async fn from_context(ctx: &Context) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(ctx.region.clone()));
        if let Some(profile) = &ctx.profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        tracing::debug!("loaded AWS configuration for {}", ctx.region);
        Self {
            s3: aws_sdk_s3::Client::new(&config),
            control: aws_sdk_sagemaker::Client::new(&config),
            runtime: aws_sdk_sagemakerruntime::Client::new(&config),
        }
    }
}

impl ManagedService for SageMaker {
    async fn upload(&self, file: &Path, location: &StorageLocation) -> Result<()> {
        let body = ByteStream::from_path(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        self.s3
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(body)
            .send()
            .await
            .map_err(raw)?;
        Ok(())
    }

    async fn create_model(&self, spec: &ModelSpec) -> Result<()> {
        let container = ContainerDefinition::builder()
            .image(&spec.image)
            .model_data_url(spec.model_data.uri())
            .set_environment(
                (!spec.environment.is_empty())
                    .then(|| spec.environment.clone().into_iter().collect()),
            )
            .build();
        self.control
            .create_model()
            .model_name(&spec.name)
            .execution_role_arn(&spec.role_arn)
            .primary_container(container)
            .send()
            .await
            .map_err(raw)?;
        Ok(())
    }

    async fn create_endpoint_config(&self, spec: &EndpointConfigSpec) -> Result<()> {
        let hardware = &spec.hardware;
        let variant = ProductionVariant::builder()
            .variant_name(&spec.variant)
            .model_name(&spec.model)
            .instance_type(ProductionVariantInstanceType::from(
                hardware.instance_type.as_str(),
            ))
            .initial_instance_count(i32::try_from(hardware.instance_count)?)
            .container_startup_health_check_timeout_in_seconds(i32::try_from(
                hardware.health_check_timeout,
            )?)
            .model_data_download_timeout_in_seconds(i32::try_from(hardware.download_timeout)?)
            .build();
        self.control
            .create_endpoint_config()
            .endpoint_config_name(&spec.name)
            .production_variants(variant)
            .send()
            .await
            .map_err(raw)?;
        Ok(())
    }

    async fn create_endpoint(&self, name: &str, config_name: &str) -> Result<()> {
        self.control
            .create_endpoint()
            .endpoint_name(name)
            .endpoint_config_name(config_name)
            .send()
            .await
            .map_err(raw)?;
        Ok(())
    }

    async fn describe_endpoint(&self, name: &str) -> Result<EndpointStatus> {
        let out = self
            .control
            .describe_endpoint()
            .endpoint_name(name)
            .send()
            .await
            .map_err(raw)?;
        let status = out
            .endpoint_status()
            .ok_or_else(|| anyhow!("endpoint {name} has no status"))?;
        Ok(EndpointStatus::parse(status.as_str(), out.failure_reason()))
    }

    async fn invoke_endpoint(&self, name: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let out = self
            .runtime
            .invoke_endpoint()
            .endpoint_name(name)
            .content_type("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(raw)?;
        Ok(out.body().map(|b| b.as_ref().to_vec()).unwrap_or_default())
    }

    async fn delete_endpoint(&self, name: &str) -> Result<Deletion> {
        match self.control.delete_endpoint().endpoint_name(name).send().await {
            Ok(_) => Ok(Deletion::Deleted),
            Err(e) if is_missing(&e) => Ok(Deletion::Missing),
            Err(e) => Err(raw(e)),
        }
    }

    async fn delete_endpoint_config(&self, name: &str) -> Result<Deletion> {
        match self
            .control
            .delete_endpoint_config()
            .endpoint_config_name(name)
            .send()
            .await
        {
            Ok(_) => Ok(Deletion::Deleted),
            Err(e) if is_missing(&e) => Ok(Deletion::Missing),
            Err(e) => Err(raw(e)),
        }
    }
}

/// Keep the full error chain, including the service's message.
fn raw<E: std::error::Error + Send + Sync + 'static>(e: E) -> anyhow::Error {
    anyhow!("{}", DisplayErrorContext(e))
}

/// Delete calls on a missing resource fail validation with "Could not find".
fn is_missing<E: ProvideErrorMetadata, R>(e: &SdkError<E, R>) -> bool {
    e.message().is_some_and(|m| m.contains("Could not find"))
}
