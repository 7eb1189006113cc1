//! Domain types for the visionary pipeline.
//!
//! This module contains the core data structures:
//! - Plan: Structured output of the planning stage
//! - Log: Append-only run log shown to the user
//! - Artifact: Image, video reference and playable video outputs
//! - Run: Run state machine and the observable snapshot

pub mod artifact;
pub mod log;
pub mod plan;
pub mod run;

// Re-export commonly used types
pub use artifact::{ArtifactError, ImageAsset, PlayableVideo, RunArtifacts, VideoLocator};
pub use log::{preview, LogEntry, LogSource, RunLog, Severity};
pub use plan::Plan;
pub use run::{RunSnapshot, RunState, StateTransition, TransitionError};
