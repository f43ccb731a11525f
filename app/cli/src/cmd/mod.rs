//! CLI argument parsing and subcommand dispatch.

use crate::config::{DeployConfig, resolve_config};
use anyhow::Result;
use bundle::{Hub, Resolver};
use clap::{Parser, Subcommand};
use compact_str::CompactString;
use endpoint::{Driver, ManagedService};
use std::path::PathBuf;

pub mod config;
pub mod deploy;
pub mod inspect;
pub mod invoke;
pub mod pack;
pub mod run;

/// Multi-adapter LoRA bundles on managed inference endpoints.
#[derive(Parser, Debug)]
#[command(name = "loradeploy", about = "Multi-adapter LoRA bundles on managed inference endpoints")]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Deployment file override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch adapters, write serving.properties and pack the archive.
    Bundle {
        /// Remove an existing bundle root first.
        #[arg(long)]
        clean: bool,
    },
    /// Upload an archive and bring up an endpoint serving it.
    Deploy {
        /// Archive to deploy. Defaults to the configured archive path.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Send one request to a running endpoint.
    Invoke {
        /// Endpoint name.
        #[arg(long)]
        endpoint: CompactString,
        /// Adapter to apply. The base model answers when omitted.
        #[arg(long)]
        adapter: Option<CompactString>,
        /// Generation length cap.
        #[arg(long)]
        max_new_tokens: Option<u32>,
        /// Prompt text.
        text: String,
    },
    /// Delete an endpoint and its configuration.
    Teardown {
        /// Endpoint name.
        #[arg(long)]
        endpoint: CompactString,
    },
    /// Bundle, deploy, query every adapter and tear down.
    Run {
        /// Leave the endpoint running.
        #[arg(long)]
        keep: bool,
        /// Remove an existing bundle root first.
        #[arg(long)]
        clean: bool,
        /// Prompt sent to the base model and each adapter.
        #[arg(long, default_value = "Tell me about Alpacas")]
        prompt: String,
        /// Generation length cap.
        #[arg(long)]
        max_new_tokens: Option<u32>,
    },
    /// List the entries of a bundle archive.
    Inspect {
        /// Archive path.
        archive: PathBuf,
    },
    /// Manage the deployment file.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Config management subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved deployment file.
    Show,
    /// Write the default deployment file.
    Init {
        /// Destination. Defaults to the global config path.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Run the parsed command.
    pub async fn run(self) -> Result<()> {
        let flag = self.config.as_deref();
        match self.command {
            Command::Inspect { archive } => inspect::run(&archive),
            Command::Config { action } => config::run(&action, flag),
            Command::Bundle { clean } => {
                let (_, config) = resolve_config(flag)?;
                pack::run(&config.bundle, &source(), clean).await?;
                Ok(())
            }
            Command::Deploy { archive } => {
                let (_, config) = resolve_config(flag)?;
                let driver = driver(&config).await?;
                let archive = archive.unwrap_or_else(|| config.bundle.archive_path());
                deploy::run(&driver, &config.endpoint, &archive).await?;
                Ok(())
            }
            Command::Invoke {
                endpoint,
                adapter,
                max_new_tokens,
                text,
            } => {
                let (_, config) = resolve_config(flag)?;
                let driver = driver(&config).await?;
                let reply =
                    invoke::run(&driver, &endpoint, adapter.as_deref(), max_new_tokens, &text)
                        .await?;
                println!("{reply}");
                Ok(())
            }
            Command::Teardown { endpoint } => {
                let (_, config) = resolve_config(flag)?;
                let driver = driver(&config).await?;
                deploy::teardown(&driver, &endpoint).await
            }
            Command::Run {
                keep,
                clean,
                prompt,
                max_new_tokens,
            } => {
                let (_, config) = resolve_config(flag)?;
                let driver = driver(&config).await?;
                let options = run::RunOptions {
                    keep,
                    clean,
                    prompt,
                    max_new_tokens,
                };
                run::run(&driver, &config, &source(), &options).await?;
                Ok(())
            }
        }
    }
}

/// Adapter source for local directories and Hub repositories.
fn source() -> Resolver {
    Resolver::new(Hub::new(reqwest::Client::new()))
}

/// Build a driver for the configured deployment.
async fn driver(config: &DeployConfig) -> Result<Driver<impl ManagedService>> {
    let service = service(&config.context).await?;
    Ok(Driver::new(service, config.context.clone())
        .with_poll(config.endpoint.poll_policy())
        .with_environment(config.endpoint.environment.clone()))
}

#[cfg(feature = "aws")]
async fn service(context: &endpoint::Context) -> Result<endpoint::SageMaker> {
    Ok(endpoint::SageMaker::from_context(context).await)
}

#[cfg(not(feature = "aws"))]
async fn service(_context: &endpoint::Context) -> Result<endpoint::InMemoryService> {
    anyhow::bail!("loradeploy was built without the `aws` feature, no managed service available")
}
