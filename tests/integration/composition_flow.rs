//! Composition ordering and option mirroring

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use armature::composition::{GeneratorFactory, GeneratorRegistry, Link};
use armature::error::EngineError;
use armature::generator::GeneratorBuilder;
use armature::options::OptionBag;
use armature::phase::Phase;

use super::test_utils::scripted_env_with_resolver;

type Log = Arc<Mutex<Vec<String>>>;

fn logging_child_factory(log: &Log, entry: &'static str) -> GeneratorFactory {
    let log = Arc::clone(log);
    Arc::new(move |env, args, options| {
        let log = Arc::clone(&log);
        Ok(GeneratorBuilder::new(env, entry)
            .args(args)
            .options(options)
            .task(entry, move |_g| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(entry.to_string());
                    Ok(())
                }
            })
            .build())
    })
}

#[tokio::test]
async fn test_deferred_child_runs_before_parent_operations() {
    let temp_dir = TempDir::new().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let registry = Arc::new(GeneratorRegistry::new());
    registry.register_name("child", logging_child_factory(&log, "child_op"));
    let (_adapter, env) = scripted_env_with_resolver(temp_dir.path(), registry);

    let parent_log = Arc::clone(&log);
    let parent = GeneratorBuilder::new(&env, "parent")
        .task("parent_op", move |_g| {
            let log = Arc::clone(&parent_log);
            async move {
                log.lock().push("parent_op".to_string());
                Ok(())
            }
        })
        .build();

    // Composed before the parent starts: the child is deferred.
    let child = parent
        .compose("child", Vec::new(), OptionBag::new(), Link::Weak)
        .unwrap();
    assert!(!child.is_running());

    parent.run().await.unwrap();

    // The deferred child started first, so its same-phase operation ran
    // ahead of the parent's.
    assert_eq!(*log.lock(), vec!["child_op", "parent_op"]);
}

#[tokio::test]
async fn test_child_composed_mid_run_starts_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let registry = Arc::new(GeneratorRegistry::new());
    registry.register_name("late_child", logging_child_factory(&log, "late_child_op"));
    let (_adapter, env) = scripted_env_with_resolver(temp_dir.path(), registry);

    let compose_log = Arc::clone(&log);
    let parent = GeneratorBuilder::new(&env, "parent")
        .operation(Phase::Prompting, "composes", move |g| {
            let log = Arc::clone(&compose_log);
            async move {
                let child = g.compose("late_child", Vec::new(), OptionBag::new(), Link::Weak)?;
                log.lock().push(format!("child_running={}", child.is_running()));
                Ok(())
            }
        })
        .build();

    parent.run().await.unwrap();

    let entries = log.lock().clone();
    // The compose call initiated the child synchronously...
    assert_eq!(entries[0], "child_running=true");
    // ...and its default-phase operation still executed within the run.
    assert!(entries.contains(&"late_child_op".to_string()));
}

#[tokio::test]
async fn test_parent_skip_flags_mirror_to_child() {
    let temp_dir = TempDir::new().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let registry = Arc::new(GeneratorRegistry::new());
    registry.register_name("child", logging_child_factory(&log, "child_op"));
    let (_adapter, env) = scripted_env_with_resolver(temp_dir.path(), registry);

    let parent = GeneratorBuilder::new(&env, "parent")
        .options(
            OptionBag::new()
                .with("skip_install", json!(true))
                .with("skip_cache", json!(true)),
        )
        .task("noop", |_g| async { Ok(()) })
        .build();

    let mirrored = parent
        .compose("child", Vec::new(), OptionBag::new(), Link::Weak)
        .unwrap();
    assert!(mirrored.options().skip_install());
    assert!(mirrored.options().skip_cache());

    // An explicitly set child value wins over the mirrored parent flag.
    let explicit = parent
        .compose(
            "child",
            Vec::new(),
            OptionBag::new().with("skip_install", json!(false)),
            Link::Weak,
        )
        .unwrap();
    assert!(!explicit.options().skip_install());
    assert!(explicit.options().skip_cache());
}

#[tokio::test]
async fn test_unresolvable_composition_errors_synchronously() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(GeneratorRegistry::new());
    let (_adapter, env) = scripted_env_with_resolver(temp_dir.path(), registry);

    let parent = GeneratorBuilder::new(&env, "parent")
        .task("noop", |_g| async { Ok(()) })
        .build();

    let result = parent.compose("missing", Vec::new(), OptionBag::new(), Link::Weak);
    assert!(matches!(
        result,
        Err(EngineError::CompositionResolution { reference, .. }) if reference == "missing"
    ));
}

#[tokio::test]
async fn test_empty_child_generator_fails_the_compose_start() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(GeneratorRegistry::new());
    registry.register_name(
        "hollow",
        Arc::new(|env, args, options| {
            Ok(GeneratorBuilder::new(env, "hollow")
                .args(args)
                .options(options)
                .build())
        }),
    );
    let (_adapter, env) = scripted_env_with_resolver(temp_dir.path(), Arc::clone(&registry) as _);

    let parent = GeneratorBuilder::new(&env, "parent")
        .operation(Phase::Prompting, "composes", |g| async move {
            g.compose("hollow", Vec::new(), OptionBag::new(), Link::Weak)?;
            Ok(())
        })
        .build();

    let report = parent.run().await.unwrap();
    assert!(!report.completed);
    assert!(report
        .failures
        .iter()
        .any(|f| matches!(f.error, EngineError::EmptyGenerator)));
}
