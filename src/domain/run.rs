//! Run state machine and the snapshot observed by the presentation layer.
//!
//! A Run represents a single execution of the three-stage pipeline for one
//! brief. Only the orchestrator mutates a [`RunSnapshot`]; everyone else
//! reads clones of it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::artifact::{ArtifactError, ImageAsset, PlayableVideo, RunArtifacts, VideoLocator};
use super::log::{LogEntry, RunLog};
use super::plan::Plan;

/// State of the pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for a brief
    #[default]
    Idle,

    /// Planning stage in flight
    Planning,

    /// Image stage in flight
    SynthesizingImage,

    /// Video job submitted or being polled
    SynthesizingVideo,

    /// All three stages succeeded
    Complete,

    /// A stage failed; later stages were skipped
    Failed,
}

impl RunState {
    /// One of the three in-flight states
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Planning | Self::SynthesizingImage | Self::SynthesizingVideo
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether a new brief may be accepted from this state
    pub fn accepts_submission(self) -> bool {
        !self.is_active()
    }

    /// Transitions are strictly forward; terminal states return to `Idle`
    /// only when a new run is accepted.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        matches!(
            (self, next),
            (Idle, Planning)
                | (Planning, SynthesizingImage)
                | (SynthesizingImage, SynthesizingVideo)
                | (SynthesizingVideo, Complete)
                | (Planning | SynthesizingImage | SynthesizingVideo, Failed)
                | (Complete | Failed, Idle)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::SynthesizingImage => "synthesizing-image",
            Self::SynthesizingVideo => "synthesizing-video",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A state entered during the current run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid run state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// Everything the presentation layer can observe about the current run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Identifier of the current run (None before the first submission)
    pub run_id: Option<Uuid>,

    /// Brief submitted for the current run
    pub brief: Option<String>,

    /// Current state
    pub state: RunState,

    /// States entered during the current run, in order
    pub transitions: Vec<StateTransition>,

    /// Plan produced by the planning stage
    pub plan: Option<Plan>,

    /// Outputs accumulated so far
    pub artifacts: RunArtifacts,

    /// Run log
    pub log: RunLog,

    /// When the current run was accepted
    pub started_at: Option<DateTime<Utc>>,

    /// When the current run reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Message of the error that failed the run
    pub failure: Option<String>,
}

impl RunSnapshot {
    /// Reset for a newly accepted run and move to `Planning`.
    ///
    /// Clears the log, plan and artifacts. The previous terminal state (if
    /// any) goes back to `Idle` first, so the recorded transitions always
    /// start with `Idle`.
    pub(crate) fn begin(&mut self, run_id: Uuid, brief: &str) -> Result<(), TransitionError> {
        if !self.state.accepts_submission() {
            return Err(TransitionError {
                from: self.state,
                to: RunState::Planning,
            });
        }

        if self.state.is_terminal() {
            self.advance(RunState::Idle)?;
        }

        self.run_id = Some(run_id);
        self.brief = Some(brief.to_string());
        self.plan = None;
        self.artifacts = RunArtifacts::default();
        self.log.clear();
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.failure = None;
        self.transitions = vec![StateTransition {
            state: RunState::Idle,
            at: Utc::now(),
        }];

        self.advance(RunState::Planning)
    }

    /// Move to the next state if the transition is allowed
    pub(crate) fn advance(&mut self, next: RunState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }

        let now = Utc::now();
        self.state = next;
        self.transitions.push(StateTransition {
            state: next,
            at: now,
        });
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Force `Failed` from any in-flight state, recording the message.
    ///
    /// A run that already failed keeps its first message. Returns false if
    /// the run was not active (idle or complete), leaving it untouched.
    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.state.is_active() && self.advance(RunState::Failed).is_err() {
            return false;
        }
        if self.state != RunState::Failed {
            return false;
        }
        self.failure.get_or_insert_with(|| message.into());
        true
    }

    pub(crate) fn append(&mut self, entry: LogEntry) {
        self.log.append(entry);
    }

    pub(crate) fn record_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
    }

    pub(crate) fn record_image(&mut self, image: ImageAsset) -> Result<(), ArtifactError> {
        self.require_state("image", &[RunState::SynthesizingImage])?;
        self.artifacts.set_image(image)
    }

    pub(crate) fn record_video_reference(
        &mut self,
        locator: VideoLocator,
    ) -> Result<(), ArtifactError> {
        self.require_state("video reference", &[RunState::SynthesizingVideo])?;
        self.artifacts.set_video_reference(locator)
    }

    pub(crate) fn record_playable_video(
        &mut self,
        video: PlayableVideo,
    ) -> Result<(), ArtifactError> {
        self.require_state(
            "playable video",
            &[RunState::SynthesizingVideo, RunState::Complete],
        )?;
        self.artifacts.set_playable_video(video)
    }

    fn require_state(
        &self,
        artifact: &'static str,
        allowed: &[RunState],
    ) -> Result<(), ArtifactError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ArtifactError::OutOfPhase {
                artifact,
                state: self.state,
            })
        }
    }

    /// States visited in this run, in order
    pub fn visited_states(&self) -> Vec<RunState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
