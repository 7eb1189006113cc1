//! Polling of long-running video jobs.
//!
//! A job is submitted once, then refreshed on a fixed interval until the
//! service reports it done. The default policy never gives up; a cap on
//! attempts or elapsed time can be configured.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AdapterError, JobHandle, JobStatus, VideoAdapter, VideoJobBackend};
use crate::domain::{ImageAsset, VideoLocator};

/// How often and for how long to poll a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before each status refresh
    pub interval: Duration,

    /// Give up after this many refreshes (unbounded when None)
    pub max_attempts: Option<u32>,

    /// Give up once this much time has passed since the first poll
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
            timeout: None,
        }
    }
}

impl PollPolicy {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Whether another refresh is allowed after `attempts` refreshes
    pub fn allows_another(&self, attempts: u32, elapsed: Duration) -> bool {
        let under_attempts = self.max_attempts.map_or(true, |max| attempts < max);
        let under_timeout = self.timeout.map_or(true, |limit| elapsed < limit);
        under_attempts && under_timeout
    }
}

/// Drives a submitted job to completion
#[derive(Debug, Clone, Default)]
pub struct JobPoller {
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Poll until the job is done and return its single locator.
    ///
    /// Sleeps before every refresh and holds nothing across the sleep.
    #[instrument(skip(self, backend, job), fields(job = %job.name))]
    pub async fn wait<B>(&self, backend: &B, job: &JobHandle) -> Result<VideoLocator, AdapterError>
    where
        B: VideoJobBackend + ?Sized,
    {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if !self.policy.allows_another(attempts, started.elapsed()) {
                warn!(attempts, "video job did not finish in time");
                return Err(AdapterError::JobTimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                });
            }

            tokio::time::sleep(self.policy.interval).await;
            attempts += 1;

            match backend.refresh(job).await? {
                JobStatus::Pending => {
                    debug!(attempts, "video job pending");
                }
                JobStatus::Done { locators } => {
                    info!(attempts, results = locators.len(), "video job done");
                    return locators
                        .into_iter()
                        .next()
                        .ok_or(AdapterError::NoVideoOutput);
                }
            }
        }
    }
}

/// [`VideoAdapter`] built from a job backend and a poller
#[derive(Debug, Clone)]
pub struct PollingVideoAdapter<B> {
    backend: B,
    poller: JobPoller,
}

impl<B: VideoJobBackend> PollingVideoAdapter<B> {
    pub fn new(backend: B, policy: PollPolicy) -> Self {
        Self {
            backend,
            poller: JobPoller::new(policy),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: VideoJobBackend> VideoAdapter for PollingVideoAdapter<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn generate_video(
        &self,
        image: &ImageAsset,
        prompt: &str,
    ) -> Result<VideoLocator, AdapterError> {
        let job = self.backend.submit(image, prompt).await?;
        self.poller.wait(&self.backend, &job).await
    }
}
