//! `loradeploy deploy` and `loradeploy teardown`.

use crate::config::EndpointConfig;
use anyhow::Result;
use bundle::BundleArchive;
use endpoint::{Driver, EndpointHandle, ManagedService, ModelHandle, StorageLocation};
use std::path::Path;

/// Resources created by one deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub location: StorageLocation,
    pub model: ModelHandle,
    pub endpoint: EndpointHandle,
}

/// Publish `archive` and bring up an endpoint serving it.
pub async fn run<S: ManagedService>(
    driver: &Driver<S>,
    config: &EndpointConfig,
    archive: &Path,
) -> Result<Deployment> {
    let archive = BundleArchive::open(archive)?;
    deploy(driver, config, &archive).await
}

/// Publish, register, provision and wait for an already opened archive.
pub async fn deploy<S: ManagedService>(
    driver: &Driver<S>,
    config: &EndpointConfig,
    archive: &BundleArchive,
) -> Result<Deployment> {
    let location = driver.publish(archive).await?;
    println!("uploaded {location}");

    let model = driver.register_model(&location, &config.image).await?;
    println!("model    {}", model.name);

    let endpoint = driver.provision_endpoint(&model, &config.hardware).await?;
    println!("endpoint {}", endpoint.name);

    driver.await_ready(&endpoint).await?;
    println!("endpoint {} is in service", endpoint.name);
    Ok(Deployment {
        location,
        model,
        endpoint,
    })
}

/// Delete the endpoint called `name` and its configuration.
pub async fn teardown<S: ManagedService>(driver: &Driver<S>, name: &str) -> Result<()> {
    driver.teardown(&EndpointHandle::new(name)).await?;
    println!("removed endpoint {name}");
    Ok(())
}
