//! Client-side job tracking.
//!
//! Polls a job until it is terminal or a local deadline passes. Giving up
//! locally never affects the job: the server keeps working and the job can
//! be looked up again later.

use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rangeforge_core::job::{JobLookup, JobStatus};
use rangeforge_core::types::JobId;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ApiClient;
use crate::error::ClientError;

/// Where job snapshots come from.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn job_status(&self, job_id: JobId) -> Result<JobLookup, ClientError>;
}

#[async_trait]
impl JobSource for ApiClient {
    async fn job_status(&self, job_id: JobId) -> Result<JobLookup, ClientError> {
        self.get_job(job_id).await
    }
}

#[async_trait]
impl<T: JobSource + ?Sized> JobSource for &T {
    async fn job_status(&self, job_id: JobId) -> Result<JobLookup, ClientError> {
        (**self).job_status(job_id).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("gave up waiting for job {job_id} after {}s; it continues on the server", .waited.as_secs())]
    Timeout { job_id: JobId, waited: Duration },

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct JobTracker<S> {
    source: S,
    poll_interval: Duration,
    show_progress: bool,
}

impl<S: JobSource> JobTracker<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            show_progress: true,
        }
    }

    /// Disable the terminal spinner (tests, non-interactive output).
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Wait for `job_id` to finish.
    ///
    /// Returns the job's result payload on `complete`. Polls never start
    /// closer together than the poll interval; a slow poll pushes the next
    /// one back instead of bunching them up.
    pub async fn track(
        &self,
        job_id: JobId,
        message: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, TrackError> {
        let deadline = Instant::now() + timeout;
        let spinner = self.spinner(message);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_status: Option<&'static str> = None;
        let outcome = loop {
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => {
                    break Err(TrackError::Timeout { job_id, waited: timeout });
                }
                _ = ticker.tick() => {}
            }

            let lookup = match tokio::time::timeout_at(deadline, self.source.job_status(job_id)).await {
                Err(_) => break Err(TrackError::Timeout { job_id, waited: timeout }),
                Ok(Err(e)) if e.is_transient() => {
                    tracing::warn!(%job_id, error = %e, "Job poll failed, retrying");
                    continue;
                }
                Ok(Err(e)) => break Err(e.into()),
                Ok(Ok(lookup)) => lookup,
            };

            let status = lookup.status_label();
            if last_status != Some(status) {
                tracing::debug!(%job_id, status, "Job status changed");
                spinner.set_message(format!("{message} [{status}]"));
                last_status = Some(status);
            }

            match lookup {
                JobLookup::NotFound(_) => break Err(TrackError::NotFound(job_id)),
                JobLookup::Found(job) => match job.status {
                    JobStatus::Complete => {
                        break Ok(job.result.unwrap_or(serde_json::Value::Null));
                    }
                    JobStatus::Failed => {
                        break Err(TrackError::JobFailed(
                            job.error.unwrap_or_else(|| "unknown error".to_string()),
                        ));
                    }
                    JobStatus::Queued | JobStatus::InProgress => {}
                },
            }
        };

        spinner.finish_and_clear();
        outcome
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.blue} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}
