//! The model bundle directory.

use crate::{
    ADAPTERS_DIR, AdapterArtifact, AdapterConfig, AdapterSource, BASE_DIR, BundleArchive, Error,
    PROPERTIES_FILE, Result, ServingOptions, ServingProperties, source::copy_tree, validate_name,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Where the serving runtime finds the base model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseModel {
    /// An identifier the runtime resolves itself, e.g. `huggyllama/llama-7b`.
    Hub(String),
    /// Local weights copied into `<root>/base/`.
    Embedded(PathBuf),
}

impl BaseModel {
    /// The `option.model_id` value for this reference.
    pub fn model_id(&self) -> &str {
        match self {
            Self::Hub(id) => id,
            Self::Embedded(_) => BASE_DIR,
        }
    }
}

/// A bundle being assembled on local storage.
///
/// Assembly order is free, but [`Bundle::package`] requires a base-model
/// reference and a written `serving.properties`.
#[derive(Debug)]
pub struct Bundle {
    root: PathBuf,
    base: Option<BaseModel>,
    adapters: BTreeMap<String, AdapterArtifact>,
    properties: Option<ServingProperties>,
}

impl Bundle {
    /// Create the bundle root and its `adapters/` directory.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(ADAPTERS_DIR))?;
        tracing::debug!("created bundle root {}", root.display());
        Ok(Self {
            root,
            base: None,
            adapters: BTreeMap::new(),
            properties: None,
        })
    }

    /// Bundle root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The base-model reference, if set.
    pub fn base_model(&self) -> Option<&BaseModel> {
        self.base.as_ref()
    }

    /// Fetched adapters in name order.
    pub fn adapters(&self) -> impl Iterator<Item = &AdapterArtifact> {
        self.adapters.values()
    }

    /// Look up a fetched adapter.
    pub fn adapter(&self, name: &str) -> Option<&AdapterArtifact> {
        self.adapters.get(name)
    }

    /// The manifest written by [`Bundle::write_serving_configuration`].
    pub fn properties(&self) -> Option<&ServingProperties> {
        self.properties.as_ref()
    }

    /// Set the base-model reference. Embedded weights are copied into
    /// `<root>/base/`.
    pub async fn set_base_model(&mut self, base: BaseModel) -> Result<()> {
        if let BaseModel::Embedded(src) = &base {
            if !src.is_dir() {
                return Err(Error::Assembly(format!(
                    "base model directory {} does not exist",
                    src.display()
                )));
            }
            let dest = self.root.join(BASE_DIR);
            if dest.exists() {
                tokio::fs::remove_dir_all(&dest).await?;
            }
            tokio::fs::create_dir_all(&dest).await?;
            let files = copy_tree(src, &dest).await?;
            tracing::info!("embedded {} base model files from {}", files.len(), src.display());
        }
        self.base = Some(base);
        Ok(())
    }

    /// Fetch one adapter into `adapters/<name>/`.
    ///
    /// Files are staged in a hidden directory and moved into place only when
    /// the source succeeds, so a failed fetch leaves nothing behind. Existing
    /// names, in memory or on disk, are never overwritten.
    pub async fn fetch_adapter(
        &mut self,
        source: &impl AdapterSource,
        source_id: &str,
        name: &str,
    ) -> Result<&AdapterArtifact> {
        validate_name(name)?;
        let dest = self.root.join(ADAPTERS_DIR).join(name);
        if self.adapters.contains_key(name) || dest.exists() {
            return Err(Error::NameCollision(name.to_owned()));
        }

        let staging = self.root.join(ADAPTERS_DIR).join(format!(".{name}.partial"));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let files = match source.fetch(source_id, &staging).await {
            Ok(files) => files,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(Error::Retrieval {
                    name: name.to_owned(),
                    source_id: source_id.to_owned(),
                    reason: format!("{e:#}"),
                });
            }
        };
        std::fs::rename(&staging, &dest)?;

        let config = match AdapterConfig::load(&dest) {
            Ok(Some(config)) => Some(config),
            Ok(None) => {
                tracing::warn!("adapter '{name}' has no adapter_config.json");
                None
            }
            Err(e) => {
                tracing::warn!("adapter '{name}' has an unreadable adapter_config.json: {e}");
                None
            }
        };

        tracing::info!(
            "fetched adapter '{name}' from {source_id} ({} files, rank {:?})",
            files.len(),
            config.as_ref().map(|c| c.r)
        );
        let artifact = AdapterArtifact {
            name: name.to_owned(),
            source: source_id.to_owned(),
            path: dest,
            files,
            config,
        };
        Ok(&*self.adapters.entry(name.to_owned()).or_insert(artifact))
    }

    /// Render `serving.properties` at the bundle root.
    ///
    /// The base model comes from [`Bundle::set_base_model`] or, failing that,
    /// from `options.model_id`. When adapters are present `enable_lora` is
    /// forced on and `max_loras` raised to the adapter count, whatever the
    /// caller asked for.
    pub fn write_serving_configuration(
        &mut self,
        mut options: ServingOptions,
    ) -> Result<&ServingProperties> {
        let base_id = self.base.as_ref().map(|b| b.model_id().to_owned());
        match (base_id, options.model_id.take()) {
            (Some(base), Some(id)) if base != id => {
                return Err(Error::Assembly(format!(
                    "model_id '{id}' conflicts with base model '{base}'"
                )));
            }
            (Some(base), _) => options.model_id = Some(base),
            (None, Some(id)) if !id.is_empty() => {
                self.base = Some(BaseModel::Hub(id.clone()));
                options.model_id = Some(id);
            }
            (None, _) => return Err(Error::Assembly("no base model reference".into())),
        }

        let max_rank = self.adapters.values().filter_map(AdapterArtifact::rank).max();
        let props = options
            .reconcile(self.adapters.len(), max_rank)
            .to_properties();
        props.validate()?;

        let path = self.root.join(PROPERTIES_FILE);
        std::fs::write(&path, props.render())?;
        tracing::info!("wrote {}", path.display());
        Ok(&*self.properties.insert(props))
    }

    /// Pack the bundle into a `.tar.gz` at `dest`.
    ///
    /// Checks the on-disk bundle first: `serving.properties` must exist and
    /// name a base model, and must enable adapters with enough room for every
    /// directory under `adapters/`, which may hold nothing but adapter
    /// directories. Nothing is written when a check fails.
    pub fn package(&self, dest: &Path) -> Result<BundleArchive> {
        let props_path = self.root.join(PROPERTIES_FILE);
        if !props_path.is_file() {
            return Err(Error::Assembly(format!("missing {PROPERTIES_FILE}")));
        }
        let props = ServingProperties::parse(&std::fs::read_to_string(&props_path)?);

        let Some(model_id) = props.model_id() else {
            return Err(Error::Assembly(format!(
                "{PROPERTIES_FILE} has no base model reference"
            )));
        };
        if model_id == BASE_DIR && !self.root.join(BASE_DIR).is_dir() {
            return Err(Error::Assembly("embedded base model directory is missing".into()));
        }

        let packaged = self.adapter_dirs()?;
        if !packaged.is_empty() {
            if !props.enable_lora() {
                return Err(Error::Assembly(format!(
                    "{} adapter(s) packaged but adapter support is disabled",
                    packaged.len()
                )));
            }
            let max = props.max_loras().unwrap_or(u32::MAX);
            if (max as usize) < packaged.len() {
                return Err(Error::Assembly(format!(
                    "max_loras={max} is below the {} packaged adapters",
                    packaged.len()
                )));
            }
        }

        BundleArchive::pack(&self.root, dest)
    }

    /// Non-hidden directories under `adapters/` on disk. Any other
    /// non-hidden entry there is an assembly error.
    fn adapter_dirs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.root.join(ADAPTERS_DIR))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if !entry.file_type()?.is_dir() {
                return Err(Error::Assembly(format!(
                    "{ADAPTERS_DIR}/{name} is not an adapter directory"
                )));
            }
            names.push(name);
        }
        Ok(names)
    }
}
