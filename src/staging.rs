//! Staging Store
//!
//! In-memory virtual file system where generator writes accumulate before
//! the commit pipeline finalizes them to disk. Reads fall through to disk
//! for paths that have not been staged, so generator logic sees a merged
//! view. Every mutation bumps a change generation the run driver watches to
//! re-queue the commit step.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;

/// Pending action recorded for a staged path. A file whose state has been
/// cleared (`None` in [`StagedFile`]) needs no action and is passed over by
/// the commit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedState {
    Modified,
    Deleted,
}

/// Snapshot of one staged file handed to transform stages and the terminal
/// conflict stage.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub state: Option<StagedState>,
}

#[derive(Debug, Clone)]
struct StagedEntry {
    contents: Vec<u8>,
    state: Option<StagedState>,
}

/// The shared staging store.
#[derive(Debug, Default)]
pub struct StagingStore {
    files: RwLock<BTreeMap<PathBuf, StagedEntry>>,
    generation: AtomicU64,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter bumped on every staged mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Read a path through the staged view: staged contents win, then disk,
    /// then the provided default. A staged deletion hides the disk copy.
    pub fn read(&self, path: &Path, default: Option<&[u8]>) -> Option<Vec<u8>> {
        {
            let files = self.files.read();
            if let Some(entry) = files.get(path) {
                return match entry.state {
                    Some(StagedState::Deleted) => default.map(|d| d.to_vec()),
                    _ => Some(entry.contents.clone()),
                };
            }
        }
        match std::fs::read(path) {
            Ok(contents) => Some(contents),
            Err(_) => default.map(|d| d.to_vec()),
        }
    }

    pub fn read_to_string(&self, path: &Path, default: Option<&str>) -> Option<String> {
        self.read(path, default.map(|d| d.as_bytes()))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a path as a JSON value, substituting `default` when the path is
    /// absent. Malformed JSON is an error, not a silent default.
    pub fn read_json(&self, path: &Path, default: Value) -> Result<Value, EngineError> {
        match self.read(path, None) {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(default),
        }
    }

    /// Stage new contents for a path.
    pub fn write(&self, path: &Path, contents: impl Into<Vec<u8>>) {
        let mut files = self.files.write();
        files.insert(
            path.to_path_buf(),
            StagedEntry {
                contents: contents.into(),
                state: Some(StagedState::Modified),
            },
        );
        drop(files);
        debug!(path = %path.display(), "Staged write");
        self.bump();
    }

    pub fn write_json(&self, path: &Path, value: &Value) -> Result<(), EngineError> {
        let rendered = serde_json::to_string_pretty(value)?;
        self.write(path, rendered.into_bytes());
        Ok(())
    }

    /// Stage a deletion for a path.
    pub fn delete(&self, path: &Path) {
        let mut files = self.files.write();
        files.insert(
            path.to_path_buf(),
            StagedEntry {
                contents: Vec::new(),
                state: Some(StagedState::Deleted),
            },
        );
        drop(files);
        debug!(path = %path.display(), "Staged delete");
        self.bump();
    }

    /// Whether the path exists in the merged staged/disk view.
    pub fn exists(&self, path: &Path) -> bool {
        {
            let files = self.files.read();
            if let Some(entry) = files.get(path) {
                return entry.state != Some(StagedState::Deleted);
            }
        }
        path.exists()
    }

    /// Snapshot of every staged file, in path order.
    pub fn staged(&self) -> Vec<StagedFile> {
        self.files
            .read()
            .iter()
            .map(|(path, entry)| StagedFile {
                path: path.clone(),
                contents: entry.contents.clone(),
                state: entry.state,
            })
            .collect()
    }

    /// Number of files with a pending action.
    pub fn pending_count(&self) -> usize {
        self.files
            .read()
            .values()
            .filter(|entry| entry.state.is_some())
            .count()
    }

    /// Clear a file's pending state, leaving its contents visible to reads.
    pub fn clear_state(&self, path: &Path) {
        let mut files = self.files.write();
        if let Some(entry) = files.get_mut(path) {
            entry.state = None;
        }
    }
}
