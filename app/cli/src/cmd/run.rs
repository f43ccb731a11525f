//! `loradeploy run`: the whole flow in one command.

use crate::{
    cmd::{deploy, invoke, pack},
    config::DeployConfig,
};
use anyhow::Result;
use bundle::AdapterSource;
use endpoint::{Driver, ManagedService, generated_text};

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Leave the endpoint running afterwards.
    pub keep: bool,
    /// Remove an existing bundle root first.
    pub clean: bool,
    /// Prompt sent to the base model and to each adapter.
    pub prompt: String,
    pub max_new_tokens: Option<u32>,
}

/// One sample answer. `adapter` is `None` for the base model.
#[derive(Debug, Clone)]
pub struct Reply {
    pub adapter: Option<String>,
    pub text: String,
}

/// Bundle, deploy, ask the base model and every adapter, then tear down
/// unless `keep` is set.
///
/// A failure after provisioning leaves the endpoint running and logs how to
/// remove it.
pub async fn run<S: ManagedService>(
    driver: &Driver<S>,
    config: &DeployConfig,
    source: &impl AdapterSource,
    options: &RunOptions,
) -> Result<Vec<Reply>> {
    let archive = pack::run(&config.bundle, source, options.clean).await?;
    let deployment = deploy::deploy(driver, &config.endpoint, &archive).await?;
    let endpoint = &deployment.endpoint;

    let selections = std::iter::once(None).chain(archive.adapter_names().into_iter().map(Some));
    let mut replies = Vec::new();
    for adapter in selections {
        let request = invoke::request(&options.prompt, adapter.as_deref(), options.max_new_tokens);
        let body = match driver.invoke(endpoint, &request).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    "endpoint {} left running, remove it with `loradeploy teardown --endpoint {}`",
                    endpoint.name,
                    endpoint.name
                );
                return Err(e.into());
            }
        };
        let text = generated_text(&body)
            .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
        println!("[{}] {text}", adapter.as_deref().unwrap_or("base"));
        replies.push(Reply { adapter, text });
    }

    if options.keep {
        println!("keeping endpoint {}", endpoint.name);
    } else {
        deploy::teardown(driver, &endpoint.name).await?;
    }
    Ok(replies)
}
