//! Tests for source identifiers and local copies.

use loradeploy_bundle::{AdapterSource, LocalDir, Locator, validate_name};
use std::path::PathBuf;

#[test]
fn parse_hub_repository() {
    assert_eq!(
        Locator::parse("tloen/alpaca-lora-7b"),
        Locator::Hub {
            repo: "tloen/alpaca-lora-7b".into(),
            revision: "main".into(),
        }
    );
}

#[test]
fn parse_hub_with_revision_and_scheme() {
    assert_eq!(
        Locator::parse("hf://22h/cabrita-lora-v0-1@v1"),
        Locator::Hub {
            repo: "22h/cabrita-lora-v0-1".into(),
            revision: "v1".into(),
        }
    );
    assert_eq!(
        Locator::parse("22h/cabrita-lora-v0-1@"),
        Locator::Hub {
            repo: "22h/cabrita-lora-v0-1".into(),
            revision: "main".into(),
        }
    );
}

#[test]
fn parse_local_paths() {
    assert_eq!(
        Locator::parse("file:///data/adapters/eng"),
        Locator::Local(PathBuf::from("/data/adapters/eng"))
    );
    assert_eq!(
        Locator::parse("/data/adapters/eng"),
        Locator::Local(PathBuf::from("/data/adapters/eng"))
    );
    assert_eq!(
        Locator::parse("./eng"),
        Locator::Local(PathBuf::from("./eng"))
    );
}

#[test]
fn existing_directory_wins_over_repo_shape() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("owner/name")).unwrap();
    let id = dir.path().join("owner/name");
    assert_eq!(
        Locator::parse(id.to_str().unwrap()),
        Locator::Local(id.clone())
    );
}

#[test]
fn names() {
    assert!(validate_name("eng_alpaca").is_ok());
    assert!(validate_name("portuguese-alpaca.v2").is_ok());
    assert!(validate_name(".ipynb_checkpoints").is_err());
    assert!(validate_name("a\\b").is_err());
    assert!(validate_name("tab\there").is_err());
}

#[tokio::test]
async fn local_copy_skips_hidden_entries() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::create_dir_all(src.join("nested")).unwrap();
    std::fs::create_dir_all(src.join(".ipynb_checkpoints")).unwrap();
    std::fs::write(src.join("adapter_model.bin"), b"weights").unwrap();
    std::fs::write(src.join("nested/tokenizer.json"), b"{}").unwrap();
    std::fs::write(src.join(".DS_Store"), b"").unwrap();
    std::fs::write(src.join(".ipynb_checkpoints/x.bin"), b"").unwrap();

    let dest = dir.path().join("dest");
    std::fs::create_dir_all(&dest).unwrap();
    let files = LocalDir
        .fetch(&format!("file://{}", src.display()), &dest)
        .await
        .unwrap();

    assert_eq!(
        files,
        vec![
            PathBuf::from("adapter_model.bin"),
            PathBuf::from("nested/tokenizer.json"),
        ]
    );
    assert!(!dest.join(".DS_Store").exists());
    assert!(!dest.join(".ipynb_checkpoints").exists());
}

#[tokio::test]
async fn local_copy_of_empty_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("empty");
    std::fs::create_dir_all(&src).unwrap();
    let dest = dir.path().join("dest");
    std::fs::create_dir_all(&dest).unwrap();

    let err = LocalDir
        .fetch(src.to_str().unwrap(), &dest)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no files"));
}
