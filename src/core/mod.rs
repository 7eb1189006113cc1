//! Core orchestration logic.
//!
//! This module contains:
//! - Orchestrator: Runs the plan, image and video stages for one brief
//! - Poller: Drives long-running video jobs to completion
//! - PipelineError: Stage failure taxonomy

pub mod error;
pub mod orchestrator;
pub mod poller;

// Re-export commonly used types
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, RejectReason, Stages, SubmitOutcome};
pub use poller::{JobPoller, PollPolicy, PollingVideoAdapter};
