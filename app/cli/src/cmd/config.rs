//! Config management commands: show, init.

use crate::{
    cmd::ConfigCommand,
    config::{DeployConfig, global_config_path, resolve_config_path, write_default_config},
};
use anyhow::{Context, Result, bail};
use std::path::Path;

/// Dispatch config management subcommands.
pub fn run(action: &ConfigCommand, config_flag: Option<&Path>) -> Result<()> {
    match action {
        ConfigCommand::Show => show(config_flag),
        ConfigCommand::Init { path, force } => {
            let path = path.clone().unwrap_or_else(global_config_path);
            init(&path, *force)
        }
    }
}

fn show(config_flag: Option<&Path>) -> Result<()> {
    let Some(path) = resolve_config_path(config_flag) else {
        println!("No deployment file found, run `loradeploy config init`");
        return Ok(());
    };
    let contents =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    DeployConfig::from_toml(&contents).with_context(|| format!("parsing {}", path.display()))?;
    println!("# {}", path.display());
    print!("{contents}");
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    write_default_config(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
