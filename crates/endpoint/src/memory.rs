//! In-memory managed service.
//!
//! Simulates the control plane and serving runtime closely enough to drive
//! the whole lifecycle in tests: uploads are read back for their adapter
//! names, endpoints walk a scripted status sequence, and invocations naming
//! an adapter that was not packaged fail the way the runtime would.

use crate::{
    Deletion, EndpointConfigSpec, EndpointStatus, InvocationRequest, ManagedService, ModelSpec,
    StorageLocation,
};
use anyhow::{Result, anyhow, bail};
use bundle::BundleArchive;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    path::Path,
    sync::{Arc, Mutex},
};

/// A [`ManagedService`] call, for inspection and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    Upload,
    CreateModel,
    CreateEndpointConfig,
    CreateEndpoint,
    DescribeEndpoint,
    InvokeEndpoint,
    DeleteEndpoint,
    DeleteEndpointConfig,
}

/// Scripted in-process stand-in for the managed service.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryService {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    /// Uploaded archives by URI, with the adapters they package.
    objects: BTreeMap<String, BTreeSet<String>>,
    models: BTreeMap<String, ModelSpec>,
    configs: BTreeMap<String, EndpointConfigSpec>,
    endpoints: BTreeMap<String, Endpoint>,
    script: Vec<EndpointStatus>,
    failures: BTreeMap<Operation, String>,
    calls: Vec<Operation>,
}

struct Endpoint {
    config: String,
    pending: VecDeque<EndpointStatus>,
    status: EndpointStatus,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses new endpoints report, one per describe call. The last one
    /// repeats. Defaults to `[Creating, Ready]`.
    pub fn with_status_script(self, script: impl IntoIterator<Item = EndpointStatus>) -> Self {
        self.state().script = script.into_iter().collect();
        self
    }

    /// Make every call to `op` fail with `message`.
    pub fn fail(&self, op: Operation, message: impl Into<String>) {
        self.state().failures.insert(op, message.into());
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.state().calls.clone()
    }

    /// Number of calls made to `op`.
    pub fn count(&self, op: Operation) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    /// Adapter names packaged in the archive uploaded to `location`.
    pub fn uploaded_adapters(&self, location: &StorageLocation) -> Option<BTreeSet<String>> {
        self.state().objects.get(&location.uri()).cloned()
    }

    /// The registered model called `name`.
    pub fn model(&self, name: &str) -> Option<ModelSpec> {
        self.state().models.get(name).cloned()
    }

    /// The endpoint configuration called `name`.
    pub fn endpoint_config(&self, name: &str) -> Option<EndpointConfigSpec> {
        self.state().configs.get(name).cloned()
    }

    /// Whether an endpoint called `name` exists.
    pub fn has_endpoint(&self, name: &str) -> bool {
        self.state().endpoints.contains_key(name)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("service state lock poisoned")
    }

    /// Record the call and return the injected failure, if any.
    fn enter(&self, op: Operation) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(op);
        if let Some(message) = state.failures.get(&op) {
            bail!("{message}");
        }
        Ok(state)
    }

    fn do_upload(&self, file: &Path, location: &StorageLocation) -> Result<()> {
        let mut state = self.enter(Operation::Upload)?;
        let archive = BundleArchive::open(file)
            .map_err(|e| anyhow!("cannot read {}: {e}", file.display()))?;
        state.objects.insert(location.uri(), archive.adapter_names());
        Ok(())
    }

    fn do_create_model(&self, spec: &ModelSpec) -> Result<()> {
        let mut state = self.enter(Operation::CreateModel)?;
        if state.models.contains_key(&spec.name) {
            bail!("Cannot create already existing model \"{}\"", spec.name);
        }
        if !state.objects.contains_key(&spec.model_data.uri()) {
            bail!("Could not access model data at {}", spec.model_data);
        }
        state.models.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn do_create_endpoint_config(&self, spec: &EndpointConfigSpec) -> Result<()> {
        let mut state = self.enter(Operation::CreateEndpointConfig)?;
        if state.configs.contains_key(&spec.name) {
            bail!("Cannot create already existing endpoint configuration \"{}\"", spec.name);
        }
        if !state.models.contains_key(&spec.model) {
            bail!("Could not find model \"{}\"", spec.model);
        }
        state.configs.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn do_create_endpoint(&self, name: &str, config_name: &str) -> Result<()> {
        let mut state = self.enter(Operation::CreateEndpoint)?;
        if state.endpoints.contains_key(name) {
            bail!("Cannot create already existing endpoint \"{name}\"");
        }
        if !state.configs.contains_key(config_name) {
            bail!("Could not find endpoint configuration \"{config_name}\"");
        }
        let pending: VecDeque<_> = if state.script.is_empty() {
            [EndpointStatus::Creating, EndpointStatus::Ready].into()
        } else {
            state.script.iter().cloned().collect()
        };
        state.endpoints.insert(
            name.to_owned(),
            Endpoint {
                config: config_name.to_owned(),
                pending,
                status: EndpointStatus::Creating,
            },
        );
        Ok(())
    }

    fn do_describe_endpoint(&self, name: &str) -> Result<EndpointStatus> {
        let mut state = self.enter(Operation::DescribeEndpoint)?;
        let Some(endpoint) = state.endpoints.get_mut(name) else {
            bail!("Could not find endpoint \"{name}\"");
        };
        if let Some(next) = endpoint.pending.pop_front() {
            endpoint.status = next;
        }
        Ok(endpoint.status.clone())
    }

    fn do_invoke_endpoint(&self, name: &str, body: &[u8]) -> Result<Vec<u8>> {
        let state = self.enter(Operation::InvokeEndpoint)?;
        let Some(endpoint) = state.endpoints.get(name) else {
            bail!("Endpoint {name} not found");
        };
        if endpoint.status != EndpointStatus::Ready {
            bail!("Endpoint {name} is {}, not InService", endpoint.status);
        }
        let adapters = state
            .configs
            .get(&endpoint.config)
            .and_then(|c| state.models.get(&c.model))
            .and_then(|m| state.objects.get(&m.model_data.uri()))
            .ok_or_else(|| anyhow!("Endpoint {name} has no model data"))?;

        let request: InvocationRequest = serde_json::from_slice(body)
            .map_err(|e| anyhow!("Received client error (400): invalid request body: {e}"))?;
        let served_by = match &request.adapters {
            Some(adapter) if !adapters.contains(adapter) => {
                bail!("Received client error (424): adapter {adapter} not found")
            }
            Some(adapter) => adapter.as_str(),
            None => "base",
        };

        let text = format!("{} [{served_by}]", request.inputs);
        Ok(serde_json::to_vec(&serde_json::json!([{ "generated_text": text }]))?)
    }

    fn do_delete_endpoint(&self, name: &str) -> Result<Deletion> {
        let mut state = self.enter(Operation::DeleteEndpoint)?;
        Ok(match state.endpoints.remove(name) {
            Some(_) => Deletion::Deleted,
            None => Deletion::Missing,
        })
    }

    fn do_delete_endpoint_config(&self, name: &str) -> Result<Deletion> {
        let mut state = self.enter(Operation::DeleteEndpointConfig)?;
        Ok(match state.configs.remove(name) {
            Some(_) => Deletion::Deleted,
            None => Deletion::Missing,
        })
    }
}

impl ManagedService for InMemoryService {
    async fn upload(&self, file: &Path, location: &StorageLocation) -> Result<()> {
        self.do_upload(file, location)
    }

    async fn create_model(&self, spec: &ModelSpec) -> Result<()> {
        self.do_create_model(spec)
    }

    async fn create_endpoint_config(&self, spec: &EndpointConfigSpec) -> Result<()> {
        self.do_create_endpoint_config(spec)
    }

    async fn create_endpoint(&self, name: &str, config_name: &str) -> Result<()> {
        self.do_create_endpoint(name, config_name)
    }

    async fn describe_endpoint(&self, name: &str) -> Result<EndpointStatus> {
        self.do_describe_endpoint(name)
    }

    async fn invoke_endpoint(&self, name: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        self.do_invoke_endpoint(name, &body)
    }

    async fn delete_endpoint(&self, name: &str) -> Result<Deletion> {
        self.do_delete_endpoint(name)
    }

    async fn delete_endpoint_config(&self, name: &str) -> Result<Deletion> {
        self.do_delete_endpoint_config(name)
    }
}
