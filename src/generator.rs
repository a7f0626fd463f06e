//! Generator Runtime
//!
//! Ties the engine together: an `Environment` bundles the shared
//! collaborators (staging store, run queue, interaction adapter, generator
//! resolver), a `GeneratorBuilder` declares operations with explicit phase
//! tags, and `Generator::run` drives the shared queue phase by phase until
//! everything registered by this generator and by anything it composed has
//! completed.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::adapter::{Answers, InteractionAdapter, Question, TerminalAdapter};
use crate::commit::{self, TransformStage, CONFIG_FILENAME, GLOBAL_CONFIG_FILENAME};
use crate::composition::{self, CompositionEdge, GeneratorRegistry, GeneratorResolver, Link};
use crate::conflict::ConflictResolver;
use crate::error::EngineError;
use crate::manifest::{self, Manifest};
use crate::options::{
    self, ArgumentSpec, OptionBag, OptionSpec, OPT_FORCE, OPT_HELP, OPT_SKIP_CACHE,
    OPT_SKIP_INSTALL,
};
use crate::phase::Phase;
use crate::queue::{QueuedTask, RunFailure, RunQueue, TaskStatus};
use crate::staging::StagingStore;
use crate::storage::Storage;

const COMMIT_ONCE_TAG: &str = "commit staged changes";

/// Observable run lifecycle events, delivered on subscriber channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The generator's run started.
    Run,
    /// Emitted immediately before an operation is invoked.
    Method(String),
    /// An operation's body returned an error.
    OperationFailed { operation: String, message: String },
    /// All phases finished; emitted exactly once per started generator.
    End,
}

/// Typed outcome of a run. Operation failures are values here, not panics:
/// `completed` is false when a failure stopped later phases from starting.
#[derive(Debug)]
pub struct RunReport {
    pub failures: Vec<RunFailure>,
    pub completed: bool,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.completed && self.failures.is_empty()
    }
}

/// An operation body: invoked with a handle on its own generator.
pub type OperationBody =
    Arc<dyn Fn(Generator) -> BoxFuture<'static, Result<(), EngineError>> + Send + Sync>;

struct Operation {
    name: String,
    phase: Phase,
    body: OperationBody,
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

struct EnvInner {
    staging: Arc<StagingStore>,
    queue: Arc<RunQueue>,
    adapter: Arc<dyn InteractionAdapter>,
    resolver: Arc<dyn GeneratorResolver>,
    cwd: PathBuf,
    started: Mutex<Vec<Generator>>,
}

/// Shared collaborators every generator in a run uses. Cheap to clone.
///
/// Composed generators share the environment, and with it the run queue;
/// that shared queue is what gives phase ordering across compositions.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    pub fn staging(&self) -> &Arc<StagingStore> {
        &self.inner.staging
    }

    pub fn queue(&self) -> &Arc<RunQueue> {
        &self.inner.queue
    }

    pub fn adapter(&self) -> &Arc<dyn InteractionAdapter> {
        &self.inner.adapter
    }

    pub fn resolver(&self) -> &Arc<dyn GeneratorResolver> {
        &self.inner.resolver
    }

    pub fn cwd(&self) -> &Path {
        &self.inner.cwd
    }

    fn note_started(&self, generator: Generator) {
        self.inner.started.lock().push(generator);
    }

    fn take_started(&self) -> Vec<Generator> {
        std::mem::take(&mut self.inner.started.lock())
    }
}

#[derive(Default)]
pub struct EnvironmentBuilder {
    adapter: Option<Arc<dyn InteractionAdapter>>,
    resolver: Option<Arc<dyn GeneratorResolver>>,
    cwd: Option<PathBuf>,
}

impl EnvironmentBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn InteractionAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn GeneratorResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn build(self) -> Environment {
        let cwd = self
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Environment {
            inner: Arc::new(EnvInner {
                staging: Arc::new(StagingStore::new()),
                queue: Arc::new(RunQueue::new()),
                adapter: self
                    .adapter
                    .unwrap_or_else(|| Arc::new(TerminalAdapter::new())),
                resolver: self
                    .resolver
                    .unwrap_or_else(|| Arc::new(GeneratorRegistry::new())),
                cwd,
                started: Mutex::new(Vec::new()),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

fn operation_name_is_eligible(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('_') && name != "constructor"
}

/// Walk up from `dir` for an existing project configuration document.
fn find_project_root(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .find(|ancestor| ancestor.join(CONFIG_FILENAME).is_file())
        .map(Path::to_path_buf)
}

/// Declares a generator: its identity, argument/option surface, and the
/// operations that make up its run, each tagged with a phase.
pub struct GeneratorBuilder {
    env: Environment,
    name: String,
    args: Vec<Value>,
    options: OptionBag,
    argument_specs: Vec<ArgumentSpec>,
    option_specs: Vec<OptionSpec>,
    operations: Vec<Operation>,
    destination_root: Option<PathBuf>,
    source_root: Option<PathBuf>,
}

impl GeneratorBuilder {
    pub fn new(env: &Environment, name: impl Into<String>) -> Self {
        let builtin_options = vec![
            OptionSpec::new(OPT_HELP).description("Print the generator's options and usage"),
            OptionSpec::new(OPT_SKIP_CACHE).description("Do not remember prompt answers"),
            OptionSpec::new(OPT_SKIP_INSTALL)
                .description("Do not automatically install dependencies"),
            OptionSpec::new(OPT_FORCE).description("Overwrite files without prompting"),
        ];
        Self {
            env: env.clone(),
            name: name.into(),
            args: Vec::new(),
            options: OptionBag::new(),
            argument_specs: Vec::new(),
            option_specs: builtin_options,
            operations: Vec::new(),
            destination_root: None,
            source_root: None,
        }
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn options(mut self, options: OptionBag) -> Self {
        self.options = options;
        self
    }

    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.argument_specs.push(spec);
        self
    }

    /// Declare a named option. A redeclaration of an existing name is kept
    /// as first-declared.
    pub fn option(mut self, spec: OptionSpec) -> Self {
        if !self.option_specs.iter().any(|o| o.name == spec.name) {
            self.option_specs.push(spec);
        }
        self
    }

    /// Register an operation in an explicit phase. Names starting with `_`
    /// and the literal `constructor` are ineligible and silently skipped.
    pub fn operation<F, Fut>(mut self, phase: Phase, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Generator) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let name = name.into();
        if !operation_name_is_eligible(&name) {
            debug!(operation = %name, "Skipping ineligible operation name");
            return self;
        }
        let body: OperationBody = Arc::new(move |generator| Box::pin(body(generator)));
        self.operations.push(Operation { name, phase, body });
        self
    }

    /// Register an operation in the default phase.
    pub fn task<F, Fut>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Generator) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        self.operation(Phase::Default, name, body)
    }

    pub fn destination_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination_root = Some(path.into());
        self
    }

    pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_root = Some(path.into());
        self
    }

    pub fn build(self) -> Generator {
        let env = self.env;
        let mut destination_root = self
            .destination_root
            .unwrap_or_else(|| env.cwd().to_path_buf());

        // An existing project document in a parent directory re-roots the
        // generator there.
        if let Some(root) = find_project_root(&destination_root) {
            if root != destination_root {
                env.adapter().writeln(&format!(
                    "Found {} in a parent directory; setting the project root at {}",
                    CONFIG_FILENAME,
                    root.display()
                ));
                destination_root = root;
            }
        }

        let manifest = Manifest::discover(&destination_root);
        let app_name = manifest::app_name(&destination_root);

        let config = Storage::new(
            self.name.clone(),
            Arc::clone(env.staging()),
            destination_root.join(CONFIG_FILENAME),
        );
        let global_path = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(GLOBAL_CONFIG_FILENAME))
            .unwrap_or_else(|| destination_root.join(GLOBAL_CONFIG_FILENAME));
        let global_config = Storage::new(
            manifest.storage_scope(),
            Arc::clone(env.staging()),
            global_path,
        );

        let conflicter = Arc::new(ConflictResolver::new(
            Arc::clone(env.adapter()),
            self.options.force(),
        ));

        let source_root = self
            .source_root
            .unwrap_or_else(|| destination_root.join("templates"));

        Generator {
            core: Arc::new(GeneratorCore {
                name: self.name,
                env,
                args: self.args,
                options: self.options,
                argument_specs: self.argument_specs,
                option_specs: self.option_specs,
                manifest,
                app_name,
                operations: Mutex::new(self.operations),
                conflicter,
                transforms: Mutex::new(Vec::new()),
                deferred: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                destination_root: RwLock::new(destination_root),
                source_root: RwLock::new(source_root),
                config: RwLock::new(config),
                global_config,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

struct GeneratorCore {
    name: String,
    env: Environment,
    args: Vec<Value>,
    options: OptionBag,
    argument_specs: Vec<ArgumentSpec>,
    option_specs: Vec<OptionSpec>,
    manifest: Manifest,
    app_name: String,
    operations: Mutex<Vec<Operation>>,
    conflicter: Arc<ConflictResolver>,
    transforms: Mutex<Vec<Arc<dyn TransformStage>>>,
    deferred: Mutex<Vec<CompositionEdge>>,
    subscribers: Mutex<Vec<UnboundedSender<RunEvent>>>,
    running: AtomicBool,
    destination_root: RwLock<PathBuf>,
    source_root: RwLock<PathBuf>,
    config: RwLock<Storage>,
    global_config: Storage,
}

/// A generator instance. Clones share the same underlying state, so the
/// handle passed into operation bodies is the generator itself.
#[derive(Clone)]
pub struct Generator {
    core: Arc<GeneratorCore>,
}

impl Generator {
    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn args(&self) -> &[Value] {
        &self.core.args
    }

    pub fn options(&self) -> &OptionBag {
        &self.core.options
    }

    pub fn app_name(&self) -> &str {
        &self.core.app_name
    }

    pub fn manifest(&self) -> &Manifest {
        &self.core.manifest
    }

    pub fn env(&self) -> &Environment {
        &self.core.env
    }

    pub fn staging(&self) -> &Arc<StagingStore> {
        self.core.env.staging()
    }

    pub fn adapter(&self) -> &Arc<dyn InteractionAdapter> {
        self.core.env.adapter()
    }

    pub fn option_specs(&self) -> &[OptionSpec] {
        &self.core.option_specs
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Project-scoped configuration storage.
    pub fn config(&self) -> Storage {
        self.core.config.read().clone()
    }

    /// Home-scoped defaults storage, namespaced `<rootName>:<rootVersion>`.
    pub fn global_config(&self) -> Storage {
        self.core.global_config.clone()
    }

    /// Declared positional arguments resolved against the provided values,
    /// option bag, and defaults.
    pub fn resolved_arguments(&self) -> std::collections::BTreeMap<String, Value> {
        options::resolve_arguments(&self.core.argument_specs, &self.core.args, &self.core.options)
    }

    pub fn destination_root(&self) -> PathBuf {
        self.core.destination_root.read().clone()
    }

    pub fn source_root(&self) -> PathBuf {
        self.core.source_root.read().clone()
    }

    pub fn set_source_root(&self, path: impl Into<PathBuf>) {
        *self.core.source_root.write() = path.into();
    }

    /// Move the destination root, creating the directory when missing and
    /// re-binding the project storage under the new root.
    pub fn set_destination_root(&self, path: impl AsRef<Path>) -> Result<PathBuf, EngineError> {
        let root = std::path::absolute(path.as_ref())?;
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        *self.core.destination_root.write() = root.clone();
        *self.core.config.write() = Storage::new(
            self.core.name.clone(),
            Arc::clone(self.core.env.staging()),
            root.join(CONFIG_FILENAME),
        );
        Ok(root)
    }

    /// Join a path to the destination root; absolute paths pass through.
    pub fn destination_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.destination_root().join(path)
        }
    }

    /// Join a path to the source root; absolute paths pass through.
    pub fn template_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.source_root().join(path)
        }
    }

    /// Stage contents for a destination-relative path.
    pub fn write(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.staging().write(&self.destination_path(path), contents);
    }

    /// Read a destination-relative path through the staged view.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.staging().read(&self.destination_path(path), None)
    }

    /// Subscribe to run lifecycle events.
    pub fn subscribe(&self) -> UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.core.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, event: RunEvent) {
        self.core
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Append a transform stage to the commit pipeline.
    pub fn register_transform(&self, stage: Arc<dyn TransformStage>) {
        self.core.transforms.lock().push(stage);
    }

    /// Prompt through the interaction adapter with answer caching.
    ///
    /// Remembered questions are prefilled from the global store first, then
    /// the project store (so project answers win), and the new answers are
    /// stored back unless `skip_cache` is set.
    pub async fn prompt(&self, mut questions: Vec<Question>) -> Result<Answers, EngineError> {
        for question in &mut questions {
            if !question.is_remembered() {
                continue;
            }
            if let Some(stored) = self.core.global_config.get(question.name()) {
                question.prefill(&stored);
            }
            if let Some(stored) = self.config().get(question.name()) {
                question.prefill(&stored);
            }
        }

        let answers = self.core.env.adapter().prompt(questions.clone()).await?;

        if !self.core.options.skip_cache() {
            for question in &questions {
                if !question.is_remembered() {
                    continue;
                }
                if let Some(value) = answers.get(question.name()) {
                    self.config().set(question.name(), value.clone())?;
                    self.core.global_config.set(question.name(), value.clone())?;
                }
            }
        }

        Ok(answers)
    }

    /// Compose with another generator.
    ///
    /// The parent's skip flags are mirrored into the child's options unless
    /// the child set them explicitly. When this generator is already
    /// running, the child's phase sequence is initiated immediately;
    /// otherwise the edge is queued and started when this generator starts.
    pub fn compose(
        &self,
        reference: &str,
        args: Vec<Value>,
        mut options: OptionBag,
        link: Link,
    ) -> Result<Generator, EngineError> {
        let mut mirrored = OptionBag::new();
        for flag in [OPT_SKIP_INSTALL, OPT_SKIP_CACHE] {
            if let Some(value) = self.core.options.get(flag) {
                mirrored.set(flag, value.clone());
            }
        }
        options.merge_missing(&mirrored);

        let child = composition::resolve_child(
            self.core.env.resolver().as_ref(),
            &self.core.env,
            reference,
            args,
            options,
        )?;

        if self.is_running() {
            debug!(parent = %self.core.name, child = %child.name(), "Composing into running generator");
            child.start()?;
        } else {
            debug!(parent = %self.core.name, child = %child.name(), "Deferring composed generator");
            self.core
                .deferred
                .lock()
                .push(CompositionEdge {
                    child: child.clone(),
                    link,
                });
        }

        Ok(child)
    }

    /// Register this generator's operations (and its deferred children's)
    /// with the shared run queue. Synchronous: no operation executes here.
    pub(crate) fn start(&self) -> Result<(), EngineError> {
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(generator = %self.core.name, "Starting generator");
        self.emit(RunEvent::Run);
        self.core.env.note_started(self.clone());

        // Deferred children start, in registration order, before this
        // generator's own phases begin.
        let deferred: Vec<CompositionEdge> = std::mem::take(&mut *self.core.deferred.lock());
        for edge in deferred {
            edge.child.start()?;
        }

        let operations: Vec<Operation> = std::mem::take(&mut *self.core.operations.lock());
        if operations.is_empty() {
            return Err(EngineError::EmptyGenerator);
        }

        for missing in options::check_required_arguments(
            &self.core.argument_specs,
            &self.core.args,
            &self.core.options,
        ) {
            warn!(generator = %self.core.name, error = %missing, "Missing required argument");
            let operation = format!("{}:arguments", self.core.name);
            self.emit(RunEvent::OperationFailed {
                operation: operation.clone(),
                message: missing.to_string(),
            });
            self.core.env.queue().record_failure(RunFailure {
                operation,
                error: missing,
            });
        }

        for operation in operations {
            self.enqueue_operation(operation);
        }

        // Every run commits staged content at least once.
        self.queue_commit();
        Ok(())
    }

    fn record_task_failure(&self, operation: &str, error: EngineError) -> TaskStatus {
        error!(operation, error = %error, "Operation failed");
        self.emit(RunEvent::OperationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        });
        let queue = self.core.env.queue();
        if matches!(error, EngineError::Aborted) {
            queue.set_fatal(EngineError::Aborted);
        }
        queue.record_failure(RunFailure {
            operation: operation.to_string(),
            error,
        });
        TaskStatus::Failed
    }

    fn enqueue_operation(&self, operation: Operation) {
        let generator = self.clone();
        let name = operation.name.clone();
        let body = operation.body;
        self.core
            .env
            .queue()
            .add(operation.phase, &operation.name, None, move || {
                Box::pin(async move {
                    generator.emit(RunEvent::Method(name.clone()));
                    debug!(operation = %name, "Running operation");
                    match (body)(generator.clone()).await {
                        Ok(()) => TaskStatus::Completed,
                        Err(err) => generator.record_task_failure(&name, err),
                    }
                })
            });
    }

    /// Queue the commit step into the conflicts phase, de-duplicated with a
    /// once tag that is released when the step is dispatched.
    fn queue_commit(&self) {
        let generator = self.clone();
        self.core.env.queue().add(
            Phase::Conflicts,
            "commit",
            Some(COMMIT_ONCE_TAG),
            move || {
                Box::pin(async move {
                    let transforms: Vec<Arc<dyn TransformStage>> =
                        generator.core.transforms.lock().clone();
                    match commit::commit(
                        generator.core.env.staging(),
                        &transforms,
                        &generator.core.conflicter,
                    )
                    .await
                    {
                        Ok(()) => TaskStatus::Completed,
                        Err(err) => generator.record_task_failure("commit", err),
                    }
                })
            },
        );
    }

    /// Run the generator: register everything, then drive the shared queue
    /// phase by phase.
    ///
    /// Within a phase, operations are dispatched concurrently and the phase
    /// boundary is a hard join. A failed operation does not cancel siblings
    /// already dispatched in the same phase, but no further phase starts.
    /// `EmptyGenerator` and a user abort are fatal and surface as `Err`;
    /// other operation failures are reported as values.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        self.start()?;

        let queue = Arc::clone(self.core.env.queue());
        let staging = Arc::clone(self.core.env.staging());

        let mut last_commit_generation: Option<u64> = None;
        let mut halted = false;

        loop {
            if queue.has_fatal() {
                halted = true;
                break;
            }

            // Content staged since the last commit drain re-queues the
            // commit step; the once tag keeps at most one pending.
            if let Some(committed) = last_commit_generation {
                if staging.generation() > committed {
                    self.queue_commit();
                }
            }

            let Some((phase, tasks)) = queue.pop_bucket() else {
                break;
            };
            debug!(phase = %phase, tasks = tasks.len(), "Draining phase bucket");

            let results = join_all(tasks.into_iter().map(QueuedTask::invoke)).await;

            if phase == Phase::Conflicts {
                last_commit_generation = Some(staging.generation());
            }
            if results.contains(&TaskStatus::Failed) {
                halted = true;
                break;
            }
        }

        let failures = queue.take_failures();
        if let Some(fatal) = queue.take_fatal() {
            return Err(fatal);
        }

        let completed = !halted;
        if completed {
            for generator in self.core.env.take_started() {
                generator.emit(RunEvent::End);
            }
            info!(generator = %self.core.name, "Generator run complete");
        }

        Ok(RunReport {
            failures,
            completed,
        })
    }
}
