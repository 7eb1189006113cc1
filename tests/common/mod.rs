//! Scripted stage adapters shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use visionary::adapters::{
    AdapterError, ImageAdapter, JobHandle, JobStatus, PlanAdapter, PlaybackFetcher,
    VideoJobBackend,
};
use visionary::core::{Orchestrator, PollPolicy, PollingVideoAdapter, Stages};
use visionary::domain::{ImageAsset, Plan, PlayableVideo, VideoLocator};

pub const BRIEF: &str = "a quiet harbor at dawn";
pub const VIDEO_URI: &str = "https://media.example/files/take-1:download";

/// What a scripted stage does when called
#[derive(Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail(fn() -> AdapterError),
    FailOnce(fn() -> AdapterError),
    Panic,
}

impl Behavior {
    fn apply(self, call: u32) -> Result<(), AdapterError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(error) => Err(error()),
            Behavior::FailOnce(error) if call == 1 => Err(error()),
            Behavior::FailOnce(_) => Ok(()),
            Behavior::Panic => panic!("stage adapter blew up"),
        }
    }
}

pub fn harbor_plan() -> Plan {
    Plan {
        visual_prompt: "Wide shot of a small harbor at first light, mist over still water, \
                        fishing boats moored along a stone quay, soft pastel sky"
            .to_string(),
        motion_prompt: "Slow push-in toward the quay as the mist drifts and gulls cross the frame"
            .to_string(),
        reasoning: "A calm establishing shot that lets the dawn light carry the mood".to_string(),
    }
}

pub struct MockPlanner {
    behavior: Behavior,
    gate: Option<Arc<Notify>>,
    calls: AtomicU32,
}

impl MockPlanner {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            gate: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Holds every call until the gate is notified
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self::gated_with(gate, Behavior::Succeed)
    }

    pub fn gated_with(gate: Arc<Notify>, behavior: Behavior) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(behavior)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanAdapter for MockPlanner {
    fn name(&self) -> &str {
        "mock-planner"
    }

    async fn generate_plan(&self, _brief: &str) -> Result<Plan, AdapterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.behavior.apply(call)?;
        Ok(harbor_plan())
    }
}

pub struct MockImage {
    behavior: Behavior,
    bytes: Vec<u8>,
    calls: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl MockImage {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
            calls: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Succeeds with a zero-length payload
    pub fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            ..Self::new(Behavior::Succeed)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageAdapter for MockImage {
    fn name(&self) -> &str {
        "mock-image"
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageAsset, AdapterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        self.behavior.apply(call)?;
        Ok(ImageAsset::new(self.bytes.clone(), "image/jpeg"))
    }
}

/// Video job that reports done after a fixed number of refreshes
pub struct MockJobBackend {
    /// Refresh on which the job finishes (never when None)
    pub done_after: Option<u32>,
    pub locators: Vec<VideoLocator>,
    pub submit_error: Option<fn() -> AdapterError>,
    /// Returned by the refresh that would have finished the job
    pub job_error: Option<fn() -> AdapterError>,
    pub submits: AtomicU32,
    pub refreshes: AtomicU32,
    pub last_prompt: Mutex<Option<String>>,
}

impl MockJobBackend {
    pub fn done_after(polls: u32) -> Self {
        Self {
            done_after: Some(polls),
            locators: vec![VideoLocator::new(VIDEO_URI)],
            submit_error: None,
            job_error: None,
            submits: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn never_done() -> Self {
        Self {
            done_after: None,
            ..Self::done_after(0)
        }
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoJobBackend for MockJobBackend {
    fn name(&self) -> &str {
        "mock-video"
    }

    async fn submit(&self, image: &ImageAsset, prompt: &str) -> Result<JobHandle, AdapterError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        if let Some(error) = self.submit_error {
            return Err(error());
        }
        assert!(!image.is_empty(), "video job submitted without image bytes");
        Ok(JobHandle::new("operations/mock-take"))
    }

    async fn refresh(&self, job: &JobHandle) -> Result<JobStatus, AdapterError> {
        assert_eq!(job.name, "operations/mock-take");
        let poll = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;

        match self.done_after {
            Some(done) if poll >= done => match self.job_error {
                Some(error) => Err(error()),
                None => Ok(JobStatus::Done {
                    locators: self.locators.clone(),
                }),
            },
            _ => Ok(JobStatus::Pending),
        }
    }
}

pub struct MockPlayback {
    behavior: Behavior,
    calls: AtomicU32,
}

impl MockPlayback {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackFetcher for MockPlayback {
    async fn fetch(&self, locator: &VideoLocator) -> Result<PlayableVideo, AdapterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.behavior.apply(call)?;
        assert_eq!(locator.as_str(), VIDEO_URI);
        Ok(PlayableVideo::new("/tmp/visionary-take-1.mp4".into(), 2048))
    }
}

pub fn fast_policy() -> PollPolicy {
    PollPolicy::with_interval(Duration::from_millis(1))
}

pub fn polling(backend: MockJobBackend, policy: PollPolicy) -> Arc<PollingVideoAdapter<MockJobBackend>> {
    Arc::new(PollingVideoAdapter::new(backend, policy))
}

/// One set of scripted stages; every stage succeeds unless replaced
pub struct Harness {
    pub planner: Arc<MockPlanner>,
    pub image: Arc<MockImage>,
    pub video: Arc<PollingVideoAdapter<MockJobBackend>>,
    pub playback: Arc<MockPlayback>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            planner: Arc::new(MockPlanner::new(Behavior::Succeed)),
            image: Arc::new(MockImage::new(Behavior::Succeed)),
            video: polling(MockJobBackend::done_after(3), fast_policy()),
            playback: Arc::new(MockPlayback::new(Behavior::Succeed)),
        }
    }

    pub fn backend(&self) -> &MockJobBackend {
        self.video.backend()
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Stages {
            planner: self.planner.clone(),
            image: self.image.clone(),
            video: self.video.clone(),
            playback: self.playback.clone(),
        })
    }
}
