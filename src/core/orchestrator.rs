//! Main orchestrator for the three-stage pipeline.
//!
//! Drives planning, image synthesis and video synthesis in order, records
//! every step in the run log, and publishes the run snapshot through a
//! single-writer watch channel. Readers never block the run: the snapshot
//! lock is only held for the short synchronous mutations between remote
//! calls, never across an await.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    AdapterError, GeminiClient, ImageAdapter, PlanAdapter, PlaybackFetcher, VideoAdapter,
};
use crate::domain::{preview, LogEntry, LogSource, RunSnapshot, RunState, Severity, VideoLocator};

use super::error::PipelineError;
use super::poller::{PollPolicy, PollingVideoAdapter};

/// The adapters for each stage
#[derive(Clone)]
pub struct Stages {
    pub planner: Arc<dyn PlanAdapter>,
    pub image: Arc<dyn ImageAdapter>,
    pub video: Arc<dyn VideoAdapter>,
    pub playback: Arc<dyn PlaybackFetcher>,
}

impl Stages {
    /// All stages backed by one Gemini client
    pub fn gemini(client: GeminiClient, policy: PollPolicy) -> Self {
        Self {
            planner: Arc::new(client.clone()),
            image: Arc::new(client.clone()),
            video: Arc::new(PollingVideoAdapter::new(client.clone(), policy)),
            playback: Arc::new(client),
        }
    }
}

/// Result of a call to [`Orchestrator::submit`]
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Nothing changed
    Rejected(RejectReason),

    /// The run reached a terminal state
    Finished(RunSnapshot),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// Final snapshot if the run was accepted
    pub fn snapshot(&self) -> Option<&RunSnapshot> {
        match self {
            Self::Finished(snapshot) => Some(snapshot),
            Self::Rejected(_) => None,
        }
    }
}

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Brief was empty or whitespace
    EmptyBrief,

    /// Another run is in flight
    RunInFlight(RunState),
}

/// Pipeline run controller.
///
/// Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    stages: Stages,
    snapshot: watch::Sender<RunSnapshot>,
}

impl Orchestrator {
    /// Create an idle orchestrator
    pub fn new(stages: Stages) -> Self {
        let (snapshot, _) = watch::channel(RunSnapshot::default());
        Self {
            inner: Arc::new(Inner { stages, snapshot }),
        }
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn state(&self) -> RunState {
        self.inner.snapshot.borrow().state
    }

    /// Run the pipeline for `brief`.
    ///
    /// Refused without any change if the brief is blank or a run is in
    /// flight. Otherwise returns once the run is `Complete` or `Failed`;
    /// no stage error escapes.
    #[instrument(skip(self, brief))]
    pub async fn submit(&self, brief: &str) -> SubmitOutcome {
        if brief.trim().is_empty() {
            return SubmitOutcome::Rejected(RejectReason::EmptyBrief);
        }

        let run_id = Uuid::new_v4();
        let user_entry = LogEntry::new(LogSource::User, "New brief submitted").with_details(brief);
        let mut refused = None;

        // check-and-reset happens under one write so two callers cannot both win
        self.inner.snapshot.send_if_modified(|snapshot| {
            if let Err(e) = snapshot.begin(run_id, brief) {
                refused = Some(e.from);
                return false;
            }
            snapshot.append(user_entry.clone());
            true
        });

        if let Some(state) = refused {
            info!(%state, "submission refused, run in flight");
            return SubmitOutcome::Rejected(RejectReason::RunInFlight(state));
        }

        info!(%run_id, "Starting pipeline run");
        trace_entry(&user_entry);

        // the supervisor settles the run even if this future is dropped
        let inner = Arc::clone(&self.inner);
        let brief = brief.to_string();
        let supervisor = tokio::spawn(async move {
            let worker = Arc::clone(&inner);
            let run = tokio::spawn(async move { worker.drive(&brief).await });

            if let Err(join_error) = run.await {
                inner.critical_failure(&join_error.to_string());
            }
        });

        if let Err(e) = supervisor.await {
            error!(error = %e, "Run supervisor aborted");
        }

        SubmitOutcome::Finished(self.snapshot())
    }
}

impl Inner {
    /// Apply a mutation and notify readers
    fn update<R>(&self, f: impl FnOnce(&mut RunSnapshot) -> R) -> R {
        let mut result = None;
        self.snapshot.send_modify(|snapshot| result = Some(f(snapshot)));
        result.unwrap_or_else(|| unreachable!("send_modify always runs its closure"))
    }

    fn log(&self, entry: LogEntry) {
        trace_entry(&entry);
        self.update(|snapshot| snapshot.append(entry));
    }

    async fn drive(&self, brief: &str) {
        match self.run_stages(brief).await {
            Ok(locator) => self.fetch_playback(&locator).await,
            Err(e) => self.report(e),
        }
    }

    async fn run_stages(&self, brief: &str) -> Result<VideoLocator, PipelineError> {
        let stages = &self.stages;

        // Planning
        self.log(
            LogEntry::new(LogSource::Planner, "Analyzing brief...")
                .with_details(format!("Reasoning with {}", stages.planner.name())),
        );
        let plan = stages
            .planner
            .generate_plan(brief)
            .await
            .map_err(PipelineError::Planning)?;

        let goal = format!("Goal: {}", preview(&plan.reasoning, 50));
        self.update(|snapshot| {
            snapshot.record_plan(plan.clone());
            snapshot.append(
                LogEntry::new(LogSource::Planner, "Production plan created").with_details(goal),
            );
        });

        // Image
        self.update(|snapshot| snapshot.advance(RunState::SynthesizingImage))?;
        self.log(
            LogEntry::new(LogSource::ImageDept, "Commissioning assets...")
                .with_details(format!("Model: {}", stages.image.name())),
        );
        self.log(
            LogEntry::new(LogSource::ImageDept, "Processing visual prompt")
                .with_details(preview(&plan.visual_prompt, 60)),
        );
        let image = stages
            .image
            .generate_image(&plan.visual_prompt)
            .await
            .map_err(PipelineError::Image)?;
        if image.is_empty() {
            return Err(PipelineError::Image(AdapterError::NoImage));
        }

        let acquired = format!("{} bytes ({})", image.len(), image.mime_type);
        self.update(|snapshot| -> Result<(), PipelineError> {
            snapshot.record_image(image.clone())?;
            snapshot.append(
                LogEntry::new(LogSource::ImageDept, "Asset acquired").with_details(acquired),
            );
            Ok(())
        })?;

        // Video
        self.update(|snapshot| snapshot.advance(RunState::SynthesizingVideo))?;
        self.log(
            LogEntry::new(LogSource::VideoDept, "Initializing motion job...")
                .with_details(format!("Model: {}", stages.video.name())),
        );
        self.log(
            LogEntry::new(LogSource::VideoDept, "Applying motion vectors")
                .with_details(plan.motion_prompt.clone()),
        );
        let locator = stages
            .video
            .generate_video(&image, &plan.motion_prompt)
            .await
            .map_err(PipelineError::video)?;

        self.update(|snapshot| -> Result<(), PipelineError> {
            snapshot.record_video_reference(locator.clone())?;
            snapshot.append(
                LogEntry::new(LogSource::VideoDept, "Rendering complete")
                    .with_details(locator.to_string()),
            );
            snapshot.advance(RunState::Complete)?;
            snapshot.append(
                LogEntry::new(LogSource::Planner, "Production complete")
                    .with_details("Image and video assets delivered"),
            );
            Ok(())
        })?;

        info!("Run completed successfully");
        Ok(locator)
    }

    /// Resolve the locator into a local file. Never fails the run.
    async fn fetch_playback(&self, locator: &VideoLocator) {
        self.log(LogEntry::new(LogSource::VideoDept, "Fetching video for playback"));

        let result = match self.stages.playback.fetch(locator).await {
            Ok(video) => {
                let location = video.path.display().to_string();
                self.update(|snapshot| snapshot.record_playable_video(video))
                    .map(|()| location)
                    .map_err(PipelineError::from)
            }
            Err(e) => Err(PipelineError::PlaybackFetch(e)),
        };

        match result {
            Ok(location) => self.log(
                LogEntry::new(LogSource::VideoDept, "Playback ready").with_details(location),
            ),
            Err(e) => self.report(e),
        }
    }

    /// Fatal errors fail an active run; anything after completion is a warning
    fn report(&self, error: PipelineError) {
        if error.is_fatal() && self.snapshot.borrow().state.is_active() {
            self.fail(error);
        } else {
            self.warn_playback(&error);
        }
    }

    fn warn_playback(&self, error: &PipelineError) {
        self.log(
            LogEntry::new(LogSource::VideoDept, "Error fetching video")
                .with_details(error.to_string())
                .warning(),
        );
    }

    /// Stop the run on a stage error
    fn fail(&self, error: PipelineError) {
        let details = error
            .adapter_error()
            .map(ToString::to_string)
            .unwrap_or_else(|| error.to_string());
        let entry = LogEntry::new(error.source_tag(), error.headline())
            .with_details(details)
            .error();

        error!(error = %error, auth = error.is_auth(), "Run failed");
        trace_entry(&entry);

        let message = error.to_string();
        self.update(|snapshot| {
            snapshot.fail(message);
            snapshot.append(entry);
        });
    }

    /// The run task died without reporting (panic inside a stage)
    fn critical_failure(&self, message: &str) {
        self.report(PipelineError::Critical(message.to_string()));
    }
}

/// Mirror a run-log entry into diagnostics
fn trace_entry(entry: &LogEntry) {
    let details = entry.details.as_deref().unwrap_or_default();
    match entry.severity {
        Severity::Info => info!(source = %entry.source, details, "{}", entry.message),
        Severity::Warning => warn!(source = %entry.source, details, "{}", entry.message),
        Severity::Error => error!(source = %entry.source, details, "{}", entry.message),
    }
}
