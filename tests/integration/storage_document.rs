//! Configuration store behavior through a full run

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use armature::commit::CONFIG_FILENAME;
use armature::generator::GeneratorBuilder;
use armature::phase::Phase;
use armature::storage::Storage;

use super::test_utils::scripted_env;

#[tokio::test]
async fn test_config_reaches_disk_without_conflict_prompts() {
    let temp_dir = TempDir::new().unwrap();
    // A pre-existing, differing document would trigger a prompt for any
    // ordinary file; the configuration documents bypass conflict checks.
    std::fs::write(temp_dir.path().join(CONFIG_FILENAME), "{\"stale\":{}}").unwrap();
    let (adapter, env) = scripted_env(temp_dir.path());

    let generator = GeneratorBuilder::new(&env, "app")
        .operation(Phase::Configuring, "remember_choice", |g| async move {
            g.config().set("framework", json!("axum"))?;
            Ok(())
        })
        .build();

    let report = generator.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(adapter.prompt_calls(), 0);

    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(temp_dir.path().join(CONFIG_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(document["app"]["framework"], json!("axum"));
}

#[tokio::test]
async fn test_sibling_namespaces_survive_each_other() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());

    let generator = GeneratorBuilder::new(&env, "app")
        .operation(Phase::Configuring, "write_settings", |g| async move {
            // Another consumer's namespace in the same document.
            let other = Storage::new(
                "linter",
                Arc::clone(g.staging()),
                g.destination_path(armature::commit::CONFIG_FILENAME),
            );
            other.set("strict", json!(true))?;
            g.config().set("framework", json!("axum"))?;
            Ok(())
        })
        .build();

    generator.run().await.unwrap();

    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(temp_dir.path().join(CONFIG_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(document["app"]["framework"], json!("axum"));
    assert_eq!(document["linter"]["strict"], json!(true));
}

#[tokio::test]
async fn test_defaults_persist_across_handles() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());

    let generator = GeneratorBuilder::new(&env, "app").task("noop", |_g| async { Ok(()) }).build();
    let config = generator.config();

    let mut first = serde_json::Map::new();
    first.insert("x".to_string(), json!(1));
    config.defaults(first).unwrap();

    let mut second = serde_json::Map::new();
    second.insert("x".to_string(), json!(2));
    let merged = config.defaults(second).unwrap();
    assert_eq!(merged.get("x"), Some(&json!(1)));

    // A fresh handle over the same staging sees the same values.
    let reopened = generator.config();
    assert_eq!(reopened.get("x"), Some(json!(1)));
    assert!(reopened.existed());
}
