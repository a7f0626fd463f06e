//! Generator Composition
//!
//! Parent generators delegate work to child generators through a resolver
//! that can look a child up by filesystem path or by registered name. Path
//! resolution is tried first; only a not-found failure falls back to the
//! name lookup, anything else propagates to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::generator::{Environment, Generator};
use crate::options::OptionBag;

/// Linkage strength of a composition edge. A `Strong` edge reruns the child
/// even when the composition was initiated by the end user rather than the
/// generator author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Link {
    #[default]
    Weak,
    Strong,
}

/// A parent-to-child relation waiting for the parent's run to begin.
pub struct CompositionEdge {
    pub child: Generator,
    pub link: Link,
}

/// Builds a generator instance when a composition edge resolves.
pub type GeneratorFactory =
    Arc<dyn Fn(&Environment, Vec<Value>, OptionBag) -> Result<Generator, EngineError> + Send + Sync>;

/// Resolution capabilities the composition manager is parameterized over.
pub trait GeneratorResolver: Send + Sync {
    fn resolve_path(
        &self,
        path: &Path,
        env: &Environment,
        args: Vec<Value>,
        options: OptionBag,
    ) -> Result<Generator, EngineError>;

    fn resolve_name(
        &self,
        name: &str,
        env: &Environment,
        args: Vec<Value>,
        options: OptionBag,
    ) -> Result<Generator, EngineError>;
}

/// In-process registry implementation of [`GeneratorResolver`].
#[derive(Default)]
pub struct GeneratorRegistry {
    by_path: RwLock<HashMap<PathBuf, GeneratorFactory>>,
    by_name: RwLock<HashMap<String, GeneratorFactory>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_path(&self, path: impl Into<PathBuf>, factory: GeneratorFactory) {
        self.by_path.write().insert(path.into(), factory);
    }

    pub fn register_name(&self, name: impl Into<String>, factory: GeneratorFactory) {
        self.by_name.write().insert(name.into(), factory);
    }
}

impl GeneratorResolver for GeneratorRegistry {
    fn resolve_path(
        &self,
        path: &Path,
        env: &Environment,
        args: Vec<Value>,
        options: OptionBag,
    ) -> Result<Generator, EngineError> {
        let factory = self
            .by_path
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::GeneratorNotFound(path.display().to_string()))?;
        factory(env, args, options)
    }

    fn resolve_name(
        &self,
        name: &str,
        env: &Environment,
        args: Vec<Value>,
        options: OptionBag,
    ) -> Result<Generator, EngineError> {
        let factory = self
            .by_name
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::GeneratorNotFound(name.to_string()))?;
        factory(env, args, options)
    }
}

/// Resolve a composition target: path form first, name lookup as the
/// not-found fallback.
pub(crate) fn resolve_child(
    resolver: &dyn GeneratorResolver,
    env: &Environment,
    reference: &str,
    args: Vec<Value>,
    options: OptionBag,
) -> Result<Generator, EngineError> {
    match resolver.resolve_path(Path::new(reference), env, args.clone(), options.clone()) {
        Err(err) if err.is_not_found() => {
            debug!(reference, "Path resolution missed, trying registered name");
            resolver
                .resolve_name(reference, env, args, options)
                .map_err(|err| match err {
                    EngineError::GeneratorNotFound(_) => EngineError::CompositionResolution {
                        reference: reference.to_string(),
                        reason: "not registered by path or name".to_string(),
                    },
                    other => other,
                })
        }
        other => other,
    }
}
