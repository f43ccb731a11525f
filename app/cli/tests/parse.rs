//! Tests for CLI argument parsing.

use clap::Parser;
use loradeploy_cli::{Cli, Command, cmd::ConfigCommand};
use std::path::PathBuf;

#[test]
fn cli_parse_bundle() {
    let cli = Cli::parse_from(["loradeploy", "bundle"]);
    assert!(matches!(cli.command, Command::Bundle { clean: false }));
    assert!(cli.config.is_none());
}

#[test]
fn cli_parse_config_flag_after_subcommand() {
    let cli = Cli::parse_from(["loradeploy", "bundle", "--clean", "--config", "deploy.toml"]);
    assert!(matches!(cli.command, Command::Bundle { clean: true }));
    assert_eq!(cli.config, Some(PathBuf::from("deploy.toml")));
}

#[test]
fn cli_parse_deploy_archive() {
    let cli = Cli::parse_from(["loradeploy", "deploy", "--archive", "out/bundle.tar.gz"]);
    match cli.command {
        Command::Deploy { archive } => {
            assert_eq!(archive, Some(PathBuf::from("out/bundle.tar.gz")))
        }
        _ => panic!("expected Deploy command"),
    }
}

#[test]
fn cli_parse_invoke_with_adapter() {
    let cli = Cli::parse_from([
        "loradeploy",
        "invoke",
        "--endpoint",
        "lora-multi-adapter-endpoint-2026-10-19-08-30-05-000",
        "--adapter",
        "eng_alpaca",
        "--max-new-tokens",
        "128",
        "Tell me about Alpacas",
    ]);
    match cli.command {
        Command::Invoke {
            endpoint,
            adapter,
            max_new_tokens,
            text,
        } => {
            assert!(endpoint.starts_with("lora-multi-adapter-endpoint"));
            assert_eq!(adapter.as_deref(), Some("eng_alpaca"));
            assert_eq!(max_new_tokens, Some(128));
            assert_eq!(text, "Tell me about Alpacas");
        }
        _ => panic!("expected Invoke command"),
    }
}

#[test]
fn cli_parse_invoke_base_model() {
    let cli = Cli::parse_from(["loradeploy", "invoke", "--endpoint", "ep", "hello"]);
    match cli.command {
        Command::Invoke { adapter, .. } => assert!(adapter.is_none()),
        _ => panic!("expected Invoke command"),
    }
}

#[test]
fn cli_parse_invoke_requires_endpoint() {
    assert!(Cli::try_parse_from(["loradeploy", "invoke", "hello"]).is_err());
}

#[test]
fn cli_parse_run_defaults() {
    let cli = Cli::parse_from(["loradeploy", "run"]);
    match cli.command {
        Command::Run {
            keep,
            clean,
            prompt,
            max_new_tokens,
        } => {
            assert!(!keep);
            assert!(!clean);
            assert_eq!(prompt, "Tell me about Alpacas");
            assert!(max_new_tokens.is_none());
        }
        _ => panic!("expected Run command"),
    }
}

#[test]
fn cli_parse_run_keep() {
    let cli = Cli::parse_from(["loradeploy", "run", "--keep", "--prompt", "Fale sobre alpacas"]);
    match cli.command {
        Command::Run { keep, prompt, .. } => {
            assert!(keep);
            assert_eq!(prompt, "Fale sobre alpacas");
        }
        _ => panic!("expected Run command"),
    }
}

#[test]
fn cli_parse_teardown() {
    let cli = Cli::parse_from(["loradeploy", "teardown", "--endpoint", "ep"]);
    assert!(matches!(cli.command, Command::Teardown { endpoint } if endpoint == "ep"));
}

#[test]
fn cli_parse_inspect() {
    let cli = Cli::parse_from(["loradeploy", "inspect", "bundle.tar.gz"]);
    assert!(matches!(cli.command, Command::Inspect { .. }));
}

#[test]
fn cli_parse_config_init() {
    let cli = Cli::parse_from(["loradeploy", "config", "init", "--force"]);
    match cli.command {
        Command::Config {
            action: ConfigCommand::Init { path, force },
        } => {
            assert!(path.is_none());
            assert!(force);
        }
        _ => panic!("expected Config Init command"),
    }
}
