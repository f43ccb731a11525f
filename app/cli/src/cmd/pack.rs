//! `loradeploy bundle`: assemble and pack the bundle.

use crate::config::BundleConfig;
use anyhow::{Context, Result};
use bundle::{AdapterSource, BaseModel, Bundle, BundleArchive};

/// Assemble the bundle described by `config` and pack it.
///
/// With `clean`, an existing bundle root is removed first; otherwise adapters
/// already on disk collide with the configured ones.
pub async fn run(
    config: &BundleConfig,
    source: &impl AdapterSource,
    clean: bool,
) -> Result<BundleArchive> {
    if clean && config.root.exists() {
        std::fs::remove_dir_all(&config.root)
            .with_context(|| format!("removing {}", config.root.display()))?;
    }

    let mut bundle = Bundle::create(&config.root)?;
    match (&config.base_model_path, &config.base_model) {
        (Some(path), _) => bundle.set_base_model(BaseModel::Embedded(path.clone())).await?,
        (None, Some(id)) => bundle.set_base_model(BaseModel::Hub(id.clone())).await?,
        (None, None) => {}
    }

    for adapter in &config.adapters {
        let artifact = bundle
            .fetch_adapter(source, &adapter.source, &adapter.name)
            .await?;
        println!("fetched {} from {}", artifact.name, artifact.source);
    }

    bundle.write_serving_configuration(config.serving.clone())?;
    let archive = bundle.package(&config.archive_path())?;
    println!(
        "packed {} ({} entries, adapters: {})",
        archive.path().display(),
        archive.entries().len(),
        archive
            .adapter_names()
            .into_iter()
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(archive)
}
