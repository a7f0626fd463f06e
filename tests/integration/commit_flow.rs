//! Commit pipeline behavior inside a full generator run

use serde_json::json;
use tempfile::TempDir;

use armature::error::EngineError;
use armature::generator::GeneratorBuilder;
use armature::phase::Phase;

use super::test_utils::scripted_env;

#[tokio::test]
async fn test_new_file_written_and_skipped_file_untouched() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("bar.txt"), "original").unwrap();
    let (adapter, env) = scripted_env(temp_dir.path());

    // bar.txt conflicts; the user declines the overwrite.
    adapter.push_answer("action", json!("skip"));

    let generator = GeneratorBuilder::new(&env, "writer")
        .operation(Phase::Writing, "stage_files", |g| async move {
            g.write("foo.txt", b"fresh".to_vec());
            g.write("bar.txt", b"replacement".to_vec());
            Ok(())
        })
        .build();

    let report = generator.run().await.unwrap();
    assert!(report.completed);

    assert_eq!(
        std::fs::read(temp_dir.path().join("foo.txt")).unwrap(),
        b"fresh"
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join("bar.txt")).unwrap(),
        b"original"
    );
    assert_eq!(adapter.prompt_calls(), 1);
}

#[tokio::test]
async fn test_content_staged_after_conflicts_phase_still_commits() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());

    let generator = GeneratorBuilder::new(&env, "late_writer")
        .operation(Phase::Writing, "early", |g| async move {
            g.write("early.txt", b"first wave".to_vec());
            Ok(())
        })
        .operation(Phase::Install, "late", |g| async move {
            // Staged after the conflicts phase already drained once.
            g.write("late.txt", b"second wave".to_vec());
            Ok(())
        })
        .build();

    let report = generator.run().await.unwrap();
    assert!(report.is_clean());

    // The commit step ran again for the late arrival.
    assert_eq!(
        std::fs::read(temp_dir.path().join("early.txt")).unwrap(),
        b"first wave"
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join("late.txt")).unwrap(),
        b"second wave"
    );
}

#[tokio::test]
async fn test_user_abort_is_fatal_to_the_run() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("guarded.txt"), "keep me").unwrap();
    let (adapter, env) = scripted_env(temp_dir.path());
    adapter.push_answer("action", json!("abort"));

    let generator = GeneratorBuilder::new(&env, "aborter")
        .operation(Phase::Writing, "stage", |g| async move {
            g.write("guarded.txt", b"overwrite attempt".to_vec());
            Ok(())
        })
        .build();

    let result = generator.run().await;
    assert!(matches!(result, Err(EngineError::Aborted)));
    assert_eq!(
        std::fs::read(temp_dir.path().join("guarded.txt")).unwrap(),
        b"keep me"
    );
    assert!(adapter.lines().iter().any(|l| l.contains("Aborting")));
}

#[tokio::test]
async fn test_force_option_suppresses_all_prompts() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("a.txt"), "old a").unwrap();
    std::fs::write(temp_dir.path().join("b.txt"), "old b").unwrap();
    let (adapter, env) = scripted_env(temp_dir.path());

    let generator = GeneratorBuilder::new(&env, "forced")
        .options(armature::options::OptionBag::new().with("force", json!(true)))
        .operation(Phase::Writing, "stage", |g| async move {
            g.write("a.txt", b"new a".to_vec());
            g.write("b.txt", b"new b".to_vec());
            Ok(())
        })
        .build();

    generator.run().await.unwrap();

    assert_eq!(adapter.prompt_calls(), 0);
    assert_eq!(std::fs::read(temp_dir.path().join("a.txt")).unwrap(), b"new a");
    assert_eq!(std::fs::read(temp_dir.path().join("b.txt")).unwrap(), b"new b");
}
