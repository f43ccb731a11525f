//! Tests for bundle assembly and packaging.

use anyhow::bail;
use loradeploy_bundle::{
    AdapterSource, BaseModel, Bundle, BundleArchive, Error, LocalDir, ServingOptions,
};
use std::path::{Path, PathBuf};

fn write_adapter(dir: &Path, rank: usize) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("adapter_config.json"),
        format!(
            r#"{{"r": {rank}, "lora_alpha": 16, "target_modules": ["q_proj", "v_proj"],
                "base_model_name_or_path": "huggyllama/llama-7b", "peft_type": "LORA"}}"#
        ),
    )
    .unwrap();
    std::fs::write(dir.join("adapter_model.bin"), [0u8; 64]).unwrap();
    dir.to_path_buf()
}

fn options() -> ServingOptions {
    ServingOptions {
        rolling_batch: Some("lmi-dist".into()),
        ..Default::default()
    }
}

/// Fails every fetch after writing a stray file.
struct Broken;

impl AdapterSource for Broken {
    async fn fetch(&self, _id: &str, dest: &Path) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::write(dest.join("half.bin"), b"x")?;
        bail!("connection reset by peer")
    }
}

#[tokio::test]
async fn fetch_adapter_copies_files() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_adapter(&dir.path().join("src/eng"), 8);
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();

    let artifact = bundle
        .fetch_adapter(&LocalDir, src.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap();
    assert_eq!(artifact.name, "eng_alpaca");
    assert_eq!(artifact.files.len(), 2);
    assert_eq!(artifact.rank(), Some(8));
    assert!(
        dir.path()
            .join("bundle/adapters/eng_alpaca/adapter_model.bin")
            .is_file()
    );
}

#[tokio::test]
async fn duplicate_name_is_a_collision() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_adapter(&dir.path().join("src/a"), 8);
    let second = write_adapter(&dir.path().join("src/b"), 32);
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();

    bundle
        .fetch_adapter(&LocalDir, first.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap();
    let err = bundle
        .fetch_adapter(&LocalDir, second.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NameCollision(ref name) if name == "eng_alpaca"));

    // The first adapter is untouched.
    assert_eq!(bundle.adapter("eng_alpaca").unwrap().rank(), Some(8));
    let config =
        std::fs::read_to_string(dir.path().join("bundle/adapters/eng_alpaca/adapter_config.json"))
            .unwrap();
    assert!(config.contains(r#""r": 8"#));
}

#[tokio::test]
async fn existing_directory_on_disk_is_a_collision() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_adapter(&dir.path().join("src/a"), 8);
    let root = dir.path().join("bundle");
    std::fs::create_dir_all(root.join("adapters/eng_alpaca")).unwrap();

    let mut bundle = Bundle::create(&root).unwrap();
    let err = bundle
        .fetch_adapter(&LocalDir, src.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NameCollision(_)));
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_adapter(&dir.path().join("src/a"), 8);
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();

    for name in ["", ".hidden", "a/b", "../escape", "two words"] {
        let err = bundle
            .fetch_adapter(&LocalDir, src.to_str().unwrap(), name)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }), "{name:?}");
    }
}

#[tokio::test]
async fn failed_fetch_is_retrieval_error_and_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("bundle");
    let mut bundle = Bundle::create(&root).unwrap();

    let err = bundle
        .fetch_adapter(&Broken, "tloen/alpaca-lora-7b", "eng_alpaca")
        .await
        .unwrap_err();
    match err {
        Error::Retrieval {
            name,
            source_id,
            reason,
        } => {
            assert_eq!(name, "eng_alpaca");
            assert_eq!(source_id, "tloen/alpaca-lora-7b");
            assert!(reason.contains("connection reset"));
        }
        other => panic!("expected Retrieval, got {other:?}"),
    }
    assert_eq!(std::fs::read_dir(root.join("adapters")).unwrap().count(), 0);
    assert!(bundle.adapter("eng_alpaca").is_none());
}

#[tokio::test]
async fn missing_local_source_is_retrieval_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    let missing = dir.path().join("nope");

    let err = bundle
        .fetch_adapter(&LocalDir, missing.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Retrieval { .. }));
}

#[tokio::test]
async fn adapter_without_config_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src/plain");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("adapter_model.safetensors"), [1u8; 8]).unwrap();
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();

    let artifact = bundle
        .fetch_adapter(&LocalDir, src.to_str().unwrap(), "plain")
        .await
        .unwrap();
    assert!(artifact.config.is_none());
    assert_eq!(artifact.rank(), None);
}

#[tokio::test]
async fn write_serving_configuration_forces_adapter_support() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_adapter(&dir.path().join("src/a"), 16);
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    bundle
        .set_base_model(BaseModel::Hub("huggyllama/llama-7b".into()))
        .await
        .unwrap();
    bundle
        .fetch_adapter(&LocalDir, src.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap();

    let props = bundle
        .write_serving_configuration(ServingOptions {
            enable_lora: Some(false),
            max_loras: Some(0),
            ..options()
        })
        .unwrap();
    assert!(props.enable_lora());
    assert_eq!(props.max_loras(), Some(1));
    assert_eq!(props.get("option.max_lora_rank"), Some("16"));

    let on_disk =
        std::fs::read_to_string(dir.path().join("bundle/serving.properties")).unwrap();
    assert!(on_disk.contains("option.enable_lora=true\n"));
    assert!(on_disk.contains("option.model_id=huggyllama/llama-7b\n"));
}

#[test]
fn model_id_option_sets_base_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    bundle
        .write_serving_configuration(ServingOptions {
            model_id: Some("huggyllama/llama-7b".into()),
            ..options()
        })
        .unwrap();
    assert_eq!(
        bundle.base_model(),
        Some(&BaseModel::Hub("huggyllama/llama-7b".into()))
    );
}

#[tokio::test]
async fn conflicting_model_id_is_an_assembly_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    bundle
        .set_base_model(BaseModel::Hub("huggyllama/llama-7b".into()))
        .await
        .unwrap();
    let err = bundle
        .write_serving_configuration(ServingOptions {
            model_id: Some("other/model".into()),
            ..options()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
}

#[test]
fn missing_base_model_is_an_assembly_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    let err = bundle.write_serving_configuration(options()).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
    assert!(!dir.path().join("bundle/serving.properties").exists());
}

#[tokio::test]
async fn embedded_base_model_is_copied() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("weights");
    std::fs::create_dir_all(&weights).unwrap();
    std::fs::write(weights.join("config.json"), "{}").unwrap();
    std::fs::write(weights.join("model.safetensors"), [0u8; 16]).unwrap();

    let mut bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    bundle
        .set_base_model(BaseModel::Embedded(weights))
        .await
        .unwrap();
    let props = bundle.write_serving_configuration(options()).unwrap();
    assert_eq!(props.model_id(), Some("base"));
    assert!(dir.path().join("bundle/base/model.safetensors").is_file());

    let archive = bundle.package(&dir.path().join("out.tar.gz")).unwrap();
    assert!(archive.contains("base/model.safetensors"));
}

#[test]
fn package_without_properties_fails() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = Bundle::create(dir.path().join("bundle")).unwrap();
    let dest = dir.path().join("out.tar.gz");

    let err = bundle.package(&dest).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
    assert!(!dest.exists());
}

#[test]
fn package_without_model_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("bundle");
    let bundle = Bundle::create(&root).unwrap();
    std::fs::write(root.join("serving.properties"), "engine=Python\n").unwrap();

    let err = bundle.package(&dir.path().join("out.tar.gz")).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
}

#[tokio::test]
async fn package_rejects_hand_disabled_adapters() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_adapter(&dir.path().join("src/a"), 8);
    let root = dir.path().join("bundle");
    let mut bundle = Bundle::create(&root).unwrap();
    bundle
        .fetch_adapter(&LocalDir, src.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap();
    std::fs::write(
        root.join("serving.properties"),
        "engine=Python\noption.model_id=huggyllama/llama-7b\noption.enable_lora=false\n",
    )
    .unwrap();

    let err = bundle.package(&dir.path().join("out.tar.gz")).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
}

#[tokio::test]
async fn end_to_end_bundle_listing() {
    let dir = tempfile::tempdir().unwrap();
    let eng = write_adapter(&dir.path().join("src/eng"), 8);
    let pt = write_adapter(&dir.path().join("src/pt"), 16);
    let root = dir.path().join("lora-multi-adapter");

    let mut bundle = Bundle::create(&root).unwrap();
    bundle
        .set_base_model(BaseModel::Hub("huggyllama/llama-7b".into()))
        .await
        .unwrap();
    bundle
        .fetch_adapter(&LocalDir, eng.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap();
    bundle
        .fetch_adapter(&LocalDir, pt.to_str().unwrap(), "portuguese_alpaca")
        .await
        .unwrap();
    bundle.write_serving_configuration(options()).unwrap();

    // Notebook checkpoint debris must not be archived.
    std::fs::create_dir_all(root.join(".ipynb_checkpoints")).unwrap();
    std::fs::write(root.join(".ipynb_checkpoints/serving-checkpoint.properties"), "x").unwrap();
    std::fs::create_dir_all(root.join("adapters/eng_alpaca/.ipynb_checkpoints")).unwrap();

    let dest = dir.path().join("lora-multi-adapter.tar.gz");
    let archive = bundle.package(&dest).unwrap();

    assert!(archive.contains("adapters/eng_alpaca/"));
    assert!(archive.contains("adapters/portuguese_alpaca/"));
    assert!(archive.contains("serving.properties"));
    assert_eq!(
        archive
            .entries()
            .iter()
            .filter(|e| *e == "serving.properties")
            .count(),
        1
    );
    assert!(archive.entries().iter().all(|e| !e.contains(".ipynb_checkpoints")));
    assert!(
        archive
            .entries()
            .iter()
            .all(|e| !e.starts_with('/') && e.split('/').all(|part| part != ".." && part != "."))
    );
    assert_eq!(
        archive.adapter_names().into_iter().collect::<Vec<_>>(),
        vec!["eng_alpaca".to_owned(), "portuguese_alpaca".to_owned()]
    );

    // The listing read back from disk matches what was packed.
    let reopened = BundleArchive::open(&dest).unwrap();
    assert_eq!(reopened.entries(), archive.entries());
}

#[tokio::test]
async fn line_breaks_in_directives_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("bundle");
    let mut bundle = Bundle::create(&root).unwrap();
    bundle
        .set_base_model(BaseModel::Hub("huggyllama/llama-7b".into()))
        .await
        .unwrap();

    let mut injected = options();
    injected.extra.insert(
        "dtype".into(),
        "fp16\noption.model_id=other/model".into(),
    );
    let err = bundle.write_serving_configuration(injected).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
    assert!(!root.join("serving.properties").exists());

    let mut keyed = options();
    keyed.extra.insert("a=b".into(), "c".into());
    let err = bundle.write_serving_configuration(keyed).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));

    let err = bundle
        .write_serving_configuration(ServingOptions {
            rolling_batch: Some("vllm\r\noption.enable_lora=false".into()),
            ..options()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
    assert!(!root.join("serving.properties").exists());
}

#[tokio::test]
async fn stray_file_under_adapters_fails_packaging() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_adapter(&dir.path().join("src/eng"), 8);
    let root = dir.path().join("bundle");
    let mut bundle = Bundle::create(&root).unwrap();
    bundle
        .fetch_adapter(&LocalDir, src.to_str().unwrap(), "eng_alpaca")
        .await
        .unwrap();
    bundle
        .write_serving_configuration(ServingOptions {
            model_id: Some("huggyllama/llama-7b".into()),
            ..options()
        })
        .unwrap();
    std::fs::write(root.join("adapters/README.md"), "notes").unwrap();

    let dest = dir.path().join("out.tar.gz");
    let err = bundle.package(&dest).unwrap_err();
    assert!(matches!(err, Error::Assembly(_)));
    assert!(!dest.exists());

    std::fs::remove_file(root.join("adapters/README.md")).unwrap();
    let archive = bundle.package(&dest).unwrap();
    assert_eq!(
        archive.adapter_names().into_iter().collect::<Vec<_>>(),
        vec!["eng_alpaca".to_owned()]
    );
}

#[test]
fn adapter_names_ignore_plain_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("bundle");
    std::fs::create_dir_all(root.join("adapters/eng_alpaca")).unwrap();
    std::fs::write(root.join("adapters/eng_alpaca/adapter_model.bin"), [0u8; 8]).unwrap();
    std::fs::write(root.join("adapters/README.md"), "notes").unwrap();

    let archive = BundleArchive::pack(&root, &dir.path().join("out.tar.gz")).unwrap();
    assert!(archive.contains("adapters/README.md"));
    assert_eq!(
        archive.adapter_names().into_iter().collect::<Vec<_>>(),
        vec!["eng_alpaca".to_owned()]
    );
}
