//! Commit Pipeline
//!
//! Drains the staging store to disk. Staged files flow through the
//! caller-registered transform stages, then a terminal stage that routes
//! every pending write through the conflict resolver. Skipped files lose
//! their pending state; everything else is finalized.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::conflict::{ConflictResolver, Disposition};
use crate::error::EngineError;
use crate::staging::{StagedFile, StagedState, StagingStore};

/// Project-level configuration document filename.
pub const CONFIG_FILENAME: &str = ".armature.json";
/// Home-scoped cross-project defaults document filename.
pub const GLOBAL_CONFIG_FILENAME: &str = ".armature-global.json";

/// A stage run over every staged file before the terminal conflict stage.
#[async_trait]
pub trait TransformStage: Send + Sync {
    async fn transform(&self, file: &mut StagedFile) -> Result<(), EngineError>;
}

/// Whether a filename belongs to the configuration documents that bypass
/// conflict checking.
fn is_reserved_config(file: &StagedFile) -> bool {
    matches!(
        file.path.file_name().and_then(|n| n.to_str()),
        Some(CONFIG_FILENAME) | Some(GLOBAL_CONFIG_FILENAME)
    )
}

/// Drain the staging store through `stages` and the conflict resolver,
/// finalizing accepted writes to disk.
///
/// Dispositions delivered before an abort still finalize; the abort then
/// propagates to the caller with later conflicts left unresolved.
pub async fn commit(
    staging: &StagingStore,
    stages: &[Arc<dyn TransformStage>],
    resolver: &ConflictResolver,
) -> Result<(), EngineError> {
    let mut files = staging.staged();
    debug!(staged = files.len(), "Committing staged files");

    for stage in stages {
        for file in &mut files {
            stage.transform(file).await?;
        }
    }

    // Terminal stage: route pending writes through the resolver.
    let mut outcomes: Vec<(StagedFile, Option<oneshot::Receiver<Disposition>>)> = Vec::new();
    for file in files {
        if file.state.is_none() {
            continue;
        }
        if is_reserved_config(&file) || file.state == Some(StagedState::Deleted) {
            outcomes.push((file, None));
            continue;
        }
        let rx = resolver
            .enqueue(file.path.clone(), file.contents.clone())
            .await;
        outcomes.push((file, Some(rx)));
    }

    let resolution = resolver.resolve().await;

    for (file, rx) in outcomes {
        let allowed = match rx {
            None => true,
            Some(mut rx) => match rx.try_recv() {
                Ok(Disposition::Skip) => {
                    staging.clear_state(&file.path);
                    false
                }
                Ok(_) => true,
                // Never resolved: an earlier conflict aborted the batch.
                Err(_) => false,
            },
        };
        if allowed {
            finalize(staging, &file)?;
        }
    }

    resolution
}

/// Write one accepted file to disk and clear its pending state.
fn finalize(staging: &StagingStore, file: &StagedFile) -> Result<(), EngineError> {
    match file.state {
        Some(StagedState::Modified) => {
            if let Some(parent) = file.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&file.path, &file.contents)?;
        }
        Some(StagedState::Deleted) => {
            if file.path.exists() {
                std::fs::remove_file(&file.path)?;
            }
        }
        None => {}
    }
    staging.clear_state(&file.path);
    Ok(())
}
