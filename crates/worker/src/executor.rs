//! Execution of a single claimed job.
//!
//! A deploy re-validates its blueprint, records a `building` range, then
//! provisions. A destroy provisions teardown for the recorded resources.
//! Either way the job ends with exactly one terminal write, made together
//! with the range change it implies.

use std::future::Future;
use std::sync::Arc;

use rangeforge_core::error::CoreError;
use rangeforge_core::job::{Job, JobRequest, JobStatus};
use rangeforge_core::range::Range;
use rangeforge_core::tags::Region;
use rangeforge_core::types::{BlueprintId, RangeId};
use rangeforge_core::validation::validate_vpcs;
use rangeforge_db::{Store, StoreError, StoreResult};
use rangeforge_provisioner::{DeployPlan, DestroyPlan, ProvisionError, Provisioner};

use crate::config::WorkerConfig;

/// Tries at recording a job's terminal state before giving up.
pub const TERMINAL_WRITE_ATTEMPTS: u32 = 3;

/// How a job ended, before it is written back.
enum Outcome {
    Deployed(Range),
    Destroyed(RangeId),
    Failed {
        message: String,
        errored_range: Option<RangeId>,
    },
}

impl Outcome {
    fn failed(message: impl Into<String>, errored_range: Option<RangeId>) -> Self {
        Outcome::Failed {
            message: message.into(),
            errored_range,
        }
    }
}

pub struct JobExecutor {
    store: Arc<dyn Store>,
    provisioner: Arc<dyn Provisioner>,
    config: WorkerConfig,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        provisioner: Arc<dyn Provisioner>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Claim the oldest queued job and run it to a terminal state.
    ///
    /// Returns `None` when the queue is empty.
    pub async fn run_next(&self) -> StoreResult<Option<Job>> {
        let Some(job) = self.store.claim_next().await? else {
            return Ok(None);
        };

        tracing::info!(
            job_id = %job.id,
            kind = %job.kind,
            target = %job.target_key,
            "Job claimed",
        );

        let finished = self.execute(&job).await?;

        match finished.status {
            JobStatus::Complete => tracing::info!(
                job_id = %finished.id,
                attempt = finished.attempt,
                "Job complete",
            ),
            _ => tracing::warn!(
                job_id = %finished.id,
                attempt = finished.attempt,
                error = finished.error.as_deref().unwrap_or_default(),
                "Job failed",
            ),
        }

        Ok(Some(finished))
    }

    /// Run an already claimed job.
    ///
    /// Store failures along the way fail the job instead of abandoning it,
    /// so the job's target is always released. Only a terminal write that
    /// keeps failing is returned as an error.
    pub async fn execute(&self, job: &Job) -> StoreResult<Job> {
        let outcome = match &job.request {
            JobRequest::Deploy {
                blueprint_id,
                range_id,
                name,
                region,
                description,
            } => {
                self.deploy(
                    job,
                    *blueprint_id,
                    *range_id,
                    name,
                    *region,
                    description.clone(),
                )
                .await
            }
            JobRequest::Destroy { range_id } => self.destroy(job, *range_id).await,
        };
        self.finish(job, outcome).await
    }

    async fn deploy(
        &self,
        job: &Job,
        blueprint_id: BlueprintId,
        range_id: RangeId,
        name: &str,
        region: Region,
        description: Option<String>,
    ) -> Outcome {
        let blueprint = match self.store.get_blueprint(blueprint_id).await {
            Ok(Some(blueprint)) => blueprint,
            Ok(None) => {
                return Outcome::failed(format!("Blueprint {blueprint_id} no longer exists"), None)
            }
            Err(e) => return Outcome::failed(format!("Could not load blueprint: {e}"), None),
        };

        // The blueprint may predate current validation rules.
        if let Err(violations) = validate_vpcs(&blueprint.vpcs) {
            return Outcome::failed(format!("Blueprint failed validation: {violations}"), None);
        }

        let range = Range::building(range_id, &job.owner, name, description, &blueprint, region);
        match self.store.insert_range(&range).await {
            Ok(()) => {}
            Err(StoreError::Core(CoreError::Conflict(message))) => {
                return Outcome::failed(message, None)
            }
            Err(e) => return Outcome::failed(format!("Could not record range: {e}"), None),
        }
        tracing::debug!(job_id = %job.id, range_id = %range_id, "Building range recorded");

        let plan = DeployPlan {
            job_id: job.id,
            range_id,
            owner: job.owner.clone(),
            name: name.to_string(),
            provider: blueprint.provider,
            region,
            features: blueprint.features,
            vpcs: blueprint.vpcs.clone(),
        };

        match self
            .with_retry(job, || self.provisioner.deploy(&plan))
            .await
        {
            Ok(outcome) => {
                let vpcs = outcome.assemble(&blueprint.vpcs);
                Outcome::Deployed(range.into_ready(vpcs, outcome.state))
            }
            Err(e) => Outcome::failed(e.message, Some(range_id)),
        }
    }

    async fn destroy(&self, job: &Job, range_id: RangeId) -> Outcome {
        let range = match self.store.get_range(range_id).await {
            Ok(Some(range)) => range,
            Ok(None) => return Outcome::failed(format!("Range {range_id} no longer exists"), None),
            Err(e) => {
                return Outcome::failed(format!("Could not load range: {e}"), Some(range_id))
            }
        };

        let plan = DestroyPlan {
            job_id: job.id,
            range_id,
            provider: range.provider,
            region: range.region,
            resource_ids: range.resource_ids(),
            state: range.provisioner_state.clone(),
        };

        match self
            .with_retry(job, || self.provisioner.destroy(&plan))
            .await
        {
            Ok(()) => Outcome::Destroyed(range_id),
            Err(e) => Outcome::failed(e.message, Some(range_id)),
        }
    }

    /// Write the job's terminal state. A success that cannot be recorded
    /// fails the job and marks its range `error`.
    async fn finish(&self, job: &Job, outcome: Outcome) -> StoreResult<Job> {
        let (message, errored_range) = match outcome {
            Outcome::Failed {
                message,
                errored_range,
            } => (message, errored_range),
            Outcome::Deployed(range) => {
                match self
                    .write_terminal(job, || self.store.complete_deploy(job.id, &range))
                    .await
                {
                    Ok(done) => return Ok(done),
                    Err(e) => (format!("Could not record deploy result: {e}"), Some(range.id)),
                }
            }
            Outcome::Destroyed(range_id) => {
                match self
                    .write_terminal(job, || self.store.complete_destroy(job.id, range_id))
                    .await
                {
                    Ok(done) => return Ok(done),
                    Err(e) => (format!("Could not record teardown: {e}"), Some(range_id)),
                }
            }
        };

        self.write_terminal(job, || self.store.fail_job(job.id, &message, errored_range))
            .await
            .inspect_err(|e| {
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    "Could not record job failure, job left in progress",
                )
            })
    }

    /// Retry a terminal write through database errors, up to
    /// `TERMINAL_WRITE_ATTEMPTS` tries. Domain errors are returned at once.
    async fn write_terminal<F, Fut>(&self, job: &Job, mut write: F) -> StoreResult<Job>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Job>>,
    {
        let mut attempt = 1;
        loop {
            match write().await {
                Err(e @ StoreError::Database(_)) if attempt < TERMINAL_WRITE_ATTEMPTS => {
                    let delay = self.config.backoff_for(attempt);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        error = %e,
                        "Terminal write failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Call the provisioner, retrying transient failures with exponential
    /// backoff up to `max_attempts` total attempts.
    async fn with_retry<T, F, Fut>(&self, job: &Job, mut call: F) -> Result<T, ProvisionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProvisionError>>,
    {
        let limit = self.config.provision_timeout;
        let mut attempt = job.attempt.max(1);

        loop {
            let result = match tokio::time::timeout(limit, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProvisionError::timeout(limit)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_transient() || attempt >= self.config.max_attempts {
                return Err(err);
            }

            let delay = self.config.backoff_for(attempt);
            tracing::warn!(
                job_id = %job.id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Transient provisioning failure, retrying",
            );
            tokio::time::sleep(delay).await;

            attempt = self.store.record_retry(job.id).await.map_err(|e| {
                ProvisionError::terminal(format!("Could not record retry: {e}"))
            })?;
        }
    }
}
