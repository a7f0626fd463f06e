//! Conflict Resolver
//!
//! Every file write a generator stages passes through here before touching
//! disk. Unambiguous cases (new file, forced run, identical contents)
//! resolve silently; everything else enters an interactive asking loop where
//! the user can overwrite, skip, overwrite-all, inspect a diff, or abort the
//! whole run.
//!
//! Pending conflicts live in an arena with a cursor marking the resolution
//! frontier: entries are never spliced out, resolution is strictly FIFO, and
//! an abort leaves the unreached entries' completion senders unfired.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::adapter::{Choice, InteractionAdapter, Question, StatusKind};
use crate::diff;
use crate::error::EngineError;

/// Terminal outcome assigned to a single file's write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Create,
    Identical,
    Skip,
    Force,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Create => "create",
            Disposition::Identical => "identical",
            Disposition::Skip => "skip",
            Disposition::Force => "force",
        }
    }

    /// Whether the file should continue toward finalization.
    pub fn allows_write(self) -> bool {
        !matches!(self, Disposition::Skip)
    }
}

struct PendingConflict {
    path: PathBuf,
    contents: Vec<u8>,
    done: Option<oneshot::Sender<Disposition>>,
}

struct ResolverState {
    force: bool,
    arena: Vec<PendingConflict>,
    cursor: usize,
    draining: bool,
}

/// The conflict queue and its shared force flag.
pub struct ConflictResolver {
    adapter: Arc<dyn InteractionAdapter>,
    state: Mutex<ResolverState>,
}

impl ConflictResolver {
    /// `force` short-circuits every collision check for the resolver's
    /// lifetime; the overwrite-all prompt choice sets the same flag mid-run.
    pub fn new(adapter: Arc<dyn InteractionAdapter>, force: bool) -> Self {
        Self {
            adapter,
            state: Mutex::new(ResolverState {
                force,
                arena: Vec::new(),
                cursor: 0,
                draining: false,
            }),
        }
    }

    /// Queue a pending write. The returned receiver fires exactly once with
    /// the file's disposition, unless an earlier conflict aborts the batch.
    pub async fn enqueue(
        &self,
        path: PathBuf,
        contents: Vec<u8>,
    ) -> oneshot::Receiver<Disposition> {
        let path = std::path::absolute(&path).unwrap_or(path);
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;
        state.arena.push(PendingConflict {
            path,
            contents,
            done: Some(tx),
        });
        rx
    }

    /// Number of conflicts waiting past the resolution frontier.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.arena.len() - state.cursor
    }

    /// Drain the queue in FIFO order, one conflict at a time.
    ///
    /// Idempotent and re-entrant-safe: a call made while a drain is already
    /// in progress returns immediately without double-resolving. An abort
    /// stops the batch; conflicts not yet reached keep their senders unfired
    /// and stay in the arena.
    pub async fn resolve(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().await;
            if state.draining {
                return Ok(());
            }
            state.draining = true;
        }
        let result = self.drain().await;
        self.state.lock().await.draining = false;
        result
    }

    async fn drain(&self) -> Result<(), EngineError> {
        loop {
            let (index, path, contents) = {
                let mut state = self.state.lock().await;
                if state.cursor >= state.arena.len() {
                    // Fully drained; recycle the arena.
                    state.arena.clear();
                    state.cursor = 0;
                    return Ok(());
                }
                let index = state.cursor;
                let entry = &state.arena[index];
                (index, entry.path.clone(), entry.contents.clone())
            };

            let disposition = self.decide(&path, &contents).await?;
            debug!(path = %path.display(), disposition = disposition.as_str(), "Conflict resolved");

            let mut state = self.state.lock().await;
            if let Some(tx) = state.arena[index].done.take() {
                let _ = tx.send(disposition);
            }
            state.cursor += 1;
        }
    }

    /// Evaluate the transition rules for one file.
    async fn decide(&self, path: &Path, contents: &[u8]) -> Result<Disposition, EngineError> {
        let display = display_path(path);

        if !path.exists() {
            self.adapter.status(StatusKind::Create, &display);
            return Ok(Disposition::Create);
        }

        if self.state.lock().await.force {
            self.adapter.status(StatusKind::Force, &display);
            return Ok(Disposition::Force);
        }

        let existing = std::fs::read(path)?;
        if existing == contents {
            self.adapter.status(StatusKind::Identical, &display);
            return Ok(Disposition::Identical);
        }

        self.adapter.status(StatusKind::Conflict, &display);
        self.ask(path, contents, &display).await
    }

    /// The interactive asking loop; `diff` answers loop back here.
    async fn ask(
        &self,
        path: &Path,
        contents: &[u8],
        display: &str,
    ) -> Result<Disposition, EngineError> {
        loop {
            let mut choices = vec![
                Choice::new('y', "overwrite", "write"),
                Choice::new('n', "do not overwrite", "skip"),
                Choice::new('a', "overwrite this and all others", "force"),
                Choice::new('x', "abort", "abort"),
            ];
            // The diff option only makes sense for regular files.
            if path.is_file() {
                choices.push(Choice::new(
                    'd',
                    "show the differences between the old and the new",
                    "diff",
                ));
            }

            let question = Question::select("action", format!("Overwrite {display}?"), choices);
            let answers = self.adapter.prompt(vec![question]).await?;
            let action = answers
                .get("action")
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::Prompt("conflict prompt returned no action".into()))?
                .to_string();

            match action.as_str() {
                "abort" => {
                    self.adapter.writeln("Aborting ...");
                    return Err(EngineError::Aborted);
                }
                "diff" => {
                    if diff::is_binary(path, contents)? {
                        self.adapter.writeln(&diff::binary_summary(path, contents)?);
                    } else {
                        let existing = std::fs::read(path)?;
                        self.adapter.diff(
                            &String::from_utf8_lossy(&existing),
                            &String::from_utf8_lossy(contents),
                        );
                    }
                    continue;
                }
                "force" => {
                    self.state.lock().await.force = true;
                    self.adapter.status(StatusKind::Force, display);
                    return Ok(Disposition::Force);
                }
                // A plain overwrite normalizes to force.
                "write" => {
                    self.adapter.status(StatusKind::Force, display);
                    return Ok(Disposition::Force);
                }
                "skip" => {
                    self.adapter.status(StatusKind::Skip, display);
                    return Ok(Disposition::Skip);
                }
                other => {
                    return Err(EngineError::Prompt(format!(
                        "unknown conflict action '{other}'"
                    )))
                }
            }
        }
    }
}

fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}
