//! Phase scheduling behavior across a full generator run

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use armature::error::EngineError;
use armature::generator::{GeneratorBuilder, RunEvent};
use armature::phase::Phase;

use super::test_utils::scripted_env;

type Log = Arc<Mutex<Vec<String>>>;

/// Register an operation that appends `entry` to the shared log.
fn with_marker(
    builder: GeneratorBuilder,
    phase: Phase,
    name: &str,
    log: &Log,
    entry: &'static str,
) -> GeneratorBuilder {
    let log = Arc::clone(log);
    builder.operation(phase, name, move |_g| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(entry.to_string());
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_phases_execute_in_fixed_order() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    // Registered deliberately out of phase order.
    let mut builder = GeneratorBuilder::new(&env, "ordered");
    builder = with_marker(builder, Phase::Install, "after", &log, "install");
    builder = with_marker(builder, Phase::Initializing, "before", &log, "initializing");
    builder = with_marker(builder, Phase::Writing, "middle", &log, "writing");
    let generator = builder.build();

    let report = generator.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(*log.lock(), vec!["initializing", "writing", "install"]);
}

#[tokio::test]
async fn test_phase_boundary_awaits_async_completion() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let slow_log = Arc::clone(&log);
    let mut builder = GeneratorBuilder::new(&env, "slow").operation(
        Phase::Prompting,
        "slow_op",
        move |_g| {
            let log = Arc::clone(&slow_log);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().push("prompting_done".to_string());
                Ok(())
            }
        },
    );
    builder = with_marker(builder, Phase::Writing, "fast_op", &log, "writing");
    let generator = builder.build();

    generator.run().await.unwrap();

    // The writing operation must not start until the prompting phase's
    // asynchronous work has fully completed.
    assert_eq!(*log.lock(), vec!["prompting_done", "writing"]);
}

#[tokio::test]
async fn test_operations_in_one_phase_all_complete() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let slow = Arc::clone(&log);
    let mut builder = GeneratorBuilder::new(&env, "parallel").operation(
        Phase::Default,
        "sleepy",
        move |_g| {
            let log = Arc::clone(&slow);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().push("sleepy".to_string());
                Ok(())
            }
        },
    );
    builder = with_marker(builder, Phase::Default, "eager", &log, "eager");
    builder = with_marker(builder, Phase::Writing, "later", &log, "later");
    let generator = builder.build();

    generator.run().await.unwrap();

    let entries = log.lock().clone();
    assert_eq!(entries.len(), 3);
    // Both default-phase operations finish before the writing phase starts.
    assert_eq!(entries[2], "later");
}

#[tokio::test]
async fn test_run_events_are_observable() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());

    let generator = GeneratorBuilder::new(&env, "observed")
        .task("only", |_g| async { Ok(()) })
        .build();
    let mut events = generator.subscribe();

    generator.run().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen[0], RunEvent::Run);
    assert!(seen.contains(&RunEvent::Method("only".to_string())));
    assert_eq!(seen.last(), Some(&RunEvent::End));
    assert_eq!(seen.iter().filter(|e| **e == RunEvent::End).count(), 1);
}

#[tokio::test]
async fn test_failure_spares_siblings_but_stops_later_phases() {
    let temp_dir = TempDir::new().unwrap();
    let (_adapter, env) = scripted_env(temp_dir.path());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut builder = GeneratorBuilder::new(&env, "faulty").operation(
        Phase::Default,
        "boom",
        |_g| async { Err(EngineError::Config("deliberate".to_string())) },
    );
    builder = with_marker(builder, Phase::Default, "sibling", &log, "sibling");
    builder = with_marker(builder, Phase::Writing, "unreached", &log, "unreached");
    let generator = builder.build();
    let mut events = generator.subscribe();

    let report = generator.run().await.unwrap();

    assert!(!report.completed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].operation, "boom");

    let entries = log.lock().clone();
    assert!(entries.contains(&"sibling".to_string()));
    assert!(!entries.contains(&"unreached".to_string()));

    let mut saw_failure = false;
    let mut saw_end = false;
    while let Ok(event) = events.try_recv() {
        match event {
            RunEvent::OperationFailed { operation, .. } => {
                assert_eq!(operation, "boom");
                saw_failure = true;
            }
            RunEvent::End => saw_end = true,
            _ => {}
        }
    }
    assert!(saw_failure);
    // The terminal end event only fires when all phases finish.
    assert!(!saw_end);
}
