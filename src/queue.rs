//! Run Queue Host
//!
//! Shared ordered queues, one per phase, that parent and composed child
//! generators all register into. The driver repeatedly drains the first
//! non-empty bucket in phase order, so tasks added to an earlier phase while
//! a later one is running are still picked up next. This is what keeps
//! phase ordering intact across compositions. An only-once tag de-duplicates
//! repeat registrations until the tagged task is dispatched.

use std::collections::{BTreeMap, HashSet, VecDeque};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::EngineError;
use crate::phase::Phase;

/// Outcome signal a queued task reports back to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// One captured operation failure, surfaced in the run report.
#[derive(Debug)]
pub struct RunFailure {
    pub operation: String,
    pub error: EngineError,
}

type TaskBody = Box<dyn FnOnce() -> BoxFuture<'static, TaskStatus> + Send>;

/// A task waiting in a phase bucket.
pub struct QueuedTask {
    name: String,
    body: TaskBody,
    once: Option<String>,
}

impl QueuedTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(self) -> BoxFuture<'static, TaskStatus> {
        (self.body)()
    }
}

#[derive(Default)]
struct Buckets {
    queues: BTreeMap<Phase, VecDeque<QueuedTask>>,
    once_tags: HashSet<String>,
}

/// The shared queue host plus the run's failure ledger.
#[derive(Default)]
pub struct RunQueue {
    buckets: Mutex<Buckets>,
    failures: Mutex<Vec<RunFailure>>,
    fatal: Mutex<Option<EngineError>>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task in a phase bucket, preserving registration order.
    ///
    /// When `once` is given and a task with the same tag is already pending,
    /// the registration is dropped. The tag is released when the pending
    /// task is dispatched, so later registrations queue a fresh run.
    pub fn add<F>(&self, phase: Phase, name: &str, once: Option<&str>, body: F)
    where
        F: FnOnce() -> BoxFuture<'static, TaskStatus> + Send + 'static,
    {
        let mut buckets = self.buckets.lock();
        if let Some(tag) = once {
            if !buckets.once_tags.insert(tag.to_string()) {
                debug!(task = name, tag, "Dropping duplicate once-tagged task");
                return;
            }
        }
        debug!(task = name, phase = %phase, "Queueing task");
        buckets
            .queues
            .entry(phase)
            .or_default()
            .push_back(QueuedTask {
                name: name.to_string(),
                body: Box::new(body),
                once: once.map(str::to_string),
            });
    }

    /// Drain the first non-empty bucket in phase order.
    pub fn pop_bucket(&self) -> Option<(Phase, Vec<QueuedTask>)> {
        let mut buckets = self.buckets.lock();
        for phase in Phase::ORDER {
            let Some(queue) = buckets.queues.get_mut(&phase) else {
                continue;
            };
            if queue.is_empty() {
                continue;
            }
            let tasks: Vec<QueuedTask> = queue.drain(..).collect();
            for task in &tasks {
                if let Some(tag) = &task.once {
                    buckets.once_tags.remove(tag);
                }
            }
            return Some((phase, tasks));
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.buckets
            .lock()
            .queues
            .values()
            .all(|queue| queue.is_empty())
    }

    pub fn record_failure(&self, failure: RunFailure) {
        self.failures.lock().push(failure);
    }

    /// Record a run-fatal error; the first one wins.
    pub fn set_fatal(&self, error: EngineError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal.lock().is_some()
    }

    pub fn take_failures(&self) -> Vec<RunFailure> {
        std::mem::take(&mut self.failures.lock())
    }

    pub fn take_fatal(&self) -> Option<EngineError> {
        self.fatal.lock().take()
    }
}
