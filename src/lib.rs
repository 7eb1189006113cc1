//! visionary - Brief-to-video creative pipeline
//!
//! Turns a short creative brief into a production plan, a still image and
//! a short video clip, using hosted generative models for each stage.
//!
//! # Architecture
//!
//! One orchestrator owns the current run:
//! - Stages run strictly in order: plan, image, video
//! - Any stage failure stops the run; later stages never start
//! - Every step is appended to the run log, which readers observe live
//! - The video stage submits one job and polls it until done
//!
//! # Modules
//!
//! - `adapters`: Stage adapters (Gemini, Imagen, Veo)
//! - `core`: Orchestration logic (Orchestrator, Poller, PipelineError)
//! - `domain`: Data structures (Plan, RunSnapshot, RunLog, artifacts)
//! - `credentials`: API key storage
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Store the API key once
//! visionary key set <KEY>
//!
//! # Produce a clip
//! visionary run "a quiet harbor at dawn"
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod credentials;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, PipelineError, PollPolicy, Stages, SubmitOutcome};
pub use credentials::{CredentialProvider, CredentialStore};
pub use domain::{LogEntry, LogSource, Plan, RunLog, RunSnapshot, RunState};
