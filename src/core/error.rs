//! Pipeline error taxonomy.
//!
//! Every stage failure aborts the rest of the run and is logged under the
//! stage's own tag. `PlaybackFetch` is the one non-fatal kind.

use std::time::Duration;

use thiserror::Error;

use crate::adapters::AdapterError;
use crate::domain::{ArtifactError, LogSource, TransitionError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    Planning(#[source] AdapterError),

    #[error("Image synthesis failed: {0}")]
    Image(#[source] AdapterError),

    #[error("Video synthesis failed: {0}")]
    Video(#[source] AdapterError),

    #[error("Video job timed out after {attempts} polls ({elapsed:?})")]
    VideoTimeout { attempts: u32, elapsed: Duration },

    #[error("Could not fetch video for playback: {0}")]
    PlaybackFetch(#[source] AdapterError),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Critical failure: {0}")]
    Critical(String),
}

impl PipelineError {
    /// Map a video adapter error, splitting out timeouts
    pub fn video(error: AdapterError) -> Self {
        match error {
            AdapterError::JobTimedOut { attempts, elapsed } => {
                Self::VideoTimeout { attempts, elapsed }
            }
            other => Self::Video(other),
        }
    }

    /// Log tag of the stage the error belongs to
    pub fn source_tag(&self) -> LogSource {
        match self {
            Self::Planning(_) => LogSource::Planner,
            Self::Image(_) => LogSource::ImageDept,
            Self::Video(_) | Self::VideoTimeout { .. } | Self::PlaybackFetch(_) => {
                LogSource::VideoDept
            }
            Self::InvalidTransition(_) | Self::Artifact(_) | Self::Critical(_) => {
                LogSource::Planner
            }
        }
    }

    /// Short log headline
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Planning(_) => "Planning failed",
            Self::Image(_) => "Image synthesis failed",
            Self::Video(_) => "Video synthesis failed",
            Self::VideoTimeout { .. } => "Video job timed out",
            Self::PlaybackFetch(_) => "Error fetching video",
            Self::InvalidTransition(_) | Self::Artifact(_) | Self::Critical(_) => {
                "Critical failure"
            }
        }
    }

    /// Whether the run still completes despite this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PlaybackFetch(_))
    }

    /// Underlying adapter error, if any
    pub fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            Self::Planning(e) | Self::Image(e) | Self::Video(e) | Self::PlaybackFetch(e) => {
                Some(e)
            }
            _ => None,
        }
    }

    /// Whether the failure is attributable to the credential
    pub fn is_auth(&self) -> bool {
        self.adapter_error().is_some_and(AdapterError::is_auth)
    }
}
