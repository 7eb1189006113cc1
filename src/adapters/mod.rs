//! Adapter interfaces for the remote generation services.
//!
//! Each pipeline stage talks to its service through one of these traits.
//! The orchestrator only sees the input/output contracts; request and
//! response shaping stays inside the implementations.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ImageAsset, Plan, PlayableVideo, VideoLocator};

// Re-export the Gemini client
pub use gemini::GeminiClient;

/// Planning stage: brief -> plan
#[async_trait]
pub trait PlanAdapter: Send + Sync {
    /// Model or service name (shown in the run log)
    fn name(&self) -> &str;

    /// Fails if the call errors or any plan field is missing
    async fn generate_plan(&self, brief: &str) -> Result<Plan, AdapterError>;
}

/// Image stage: visual prompt -> image bytes
#[async_trait]
pub trait ImageAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Fails if no image payload comes back
    async fn generate_image(&self, prompt: &str) -> Result<ImageAsset, AdapterError>;
}

/// Video stage: image + motion prompt -> locator of the generated clip.
///
/// Implementations submit a remote job and wait for it to finish.
#[async_trait]
pub trait VideoAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_video(
        &self,
        image: &ImageAsset,
        prompt: &str,
    ) -> Result<VideoLocator, AdapterError>;
}

/// Resolves a video locator into a locally playable file
#[async_trait]
pub trait PlaybackFetcher: Send + Sync {
    async fn fetch(&self, locator: &VideoLocator) -> Result<PlayableVideo, AdapterError>;
}

/// Handle of a submitted remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Opaque job name assigned by the service
    pub name: String,
}

impl JobHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Result of one status refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still running
    Pending,

    /// Finished; carries every locator the job reported (possibly none)
    Done { locators: Vec<VideoLocator> },
}

/// Remote asynchronous video job protocol
#[async_trait]
pub trait VideoJobBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Submit the job once
    async fn submit(&self, image: &ImageAsset, prompt: &str) -> Result<JobHandle, AdapterError>;

    /// Ask the service for the job's current status
    async fn refresh(&self, job: &JobHandle) -> Result<JobStatus, AdapterError>;
}

/// Errors raised inside a stage adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("No API key configured")]
    MissingCredential,

    #[error("Request rejected as unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Plan is missing field '{0}'")]
    IncompletePlan(&'static str),

    #[error("No image payload returned")]
    NoImage,

    #[error("Invalid image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Video job failed ({code}): {message}")]
    JobFailed { code: i64, message: String },

    #[error("No output produced")]
    NoVideoOutput,

    #[error("Video job still running after {attempts} polls ({elapsed:?})")]
    JobTimedOut {
        attempts: u32,
        elapsed: std::time::Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Whether the failure is attributable to the credential
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::Unauthorized { .. })
    }
}
