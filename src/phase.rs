//! Generator Lifecycle Phases
//!
//! The scheduler buckets every operation into one of a fixed, totally ordered
//! set of phases. All operations in a phase complete (including their
//! asynchronous work) before any operation in the next phase starts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named stage in the generator lifecycle.
///
/// The ordering is fixed and not configurable per run. `Default` is the
/// catch-all bucket for operations registered without an explicit phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initializing,
    Prompting,
    Configuring,
    Default,
    Writing,
    Conflicts,
    Install,
    End,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ORDER: [Phase; 8] = [
        Phase::Initializing,
        Phase::Prompting,
        Phase::Configuring,
        Phase::Default,
        Phase::Writing,
        Phase::Conflicts,
        Phase::Install,
        Phase::End,
    ];

    /// Position of this phase in the fixed order.
    pub fn index(self) -> usize {
        Phase::ORDER.iter().position(|p| *p == self).unwrap_or(0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Prompting => "prompting",
            Phase::Configuring => "configuring",
            Phase::Default => "default",
            Phase::Writing => "writing",
            Phase::Conflicts => "conflicts",
            Phase::Install => "install",
            Phase::End => "end",
        }
    }

    /// Look a phase up by its queue name.
    pub fn from_name(name: &str) -> Option<Phase> {
        Phase::ORDER.iter().copied().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
