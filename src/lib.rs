//! Armature: Phase-Scheduled Generator Engine
//!
//! The execution core of a code-scaffolding framework. Generators declare
//! phase-tagged operations; the engine runs them through a fixed, totally
//! ordered phase pipeline, routes every staged file write through an
//! interactive conflict-resolution protocol, and lets generators compose by
//! delegating to other generators sharing the same run queue.

pub mod adapter;
pub mod commit;
pub mod composition;
pub mod conflict;
pub mod diff;
pub mod error;
pub mod generator;
pub mod logging;
pub mod manifest;
pub mod options;
pub mod phase;
pub mod queue;
pub mod staging;
pub mod storage;
