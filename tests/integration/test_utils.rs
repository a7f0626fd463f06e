//! Shared helpers for integration tests

use std::path::Path;
use std::sync::Arc;

use armature::adapter::{InteractionAdapter, ScriptedAdapter};
use armature::composition::GeneratorResolver;
use armature::generator::Environment;

/// Environment wired to a scripted adapter rooted in a sandbox directory.
pub fn scripted_env(root: &Path) -> (Arc<ScriptedAdapter>, Environment) {
    let adapter = Arc::new(ScriptedAdapter::new());
    let env = Environment::builder()
        .adapter(Arc::clone(&adapter) as Arc<dyn InteractionAdapter>)
        .cwd(root)
        .build();
    (adapter, env)
}

/// Same, but with a generator resolver for composition tests.
pub fn scripted_env_with_resolver(
    root: &Path,
    resolver: Arc<dyn GeneratorResolver>,
) -> (Arc<ScriptedAdapter>, Environment) {
    let adapter = Arc::new(ScriptedAdapter::new());
    let env = Environment::builder()
        .adapter(Arc::clone(&adapter) as Arc<dyn InteractionAdapter>)
        .resolver(resolver)
        .cwd(root)
        .build();
    (adapter, env)
}
