//! loradeploy: package a base model with several LoRA adapters into one
//! bundle, serve it from a managed endpoint, and pick the adapter per request.

pub use cmd::{Cli, Command};

pub mod cmd;
pub mod config;
