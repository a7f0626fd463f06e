//! Error types for the armature generator engine.

use thiserror::Error;

/// Errors produced by the generator engine and its collaborators.
///
/// Operation bodies may return any error through the `Other` variant;
/// the scheduler captures these per operation without cancelling siblings.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("generator has no runnable operations; register at least one")]
    EmptyGenerator,

    #[error("did not provide required argument '{name}'")]
    MissingRequiredArgument { name: String },

    #[error("process aborted by user")]
    Aborted,

    #[error("generator '{0}' not found")]
    GeneratorNotFound(String),

    #[error("cannot resolve generator '{reference}': {reason}")]
    CompositionResolution { reference: String, reason: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether a composition-resolution failure should fall back to
    /// name-based lookup instead of propagating.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::GeneratorNotFound(_))
    }
}
