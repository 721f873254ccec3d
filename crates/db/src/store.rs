//! Storage contracts.
//!
//! Admission methods (`admit_deploy`, `admit_destroy`) check and insert in
//! one atomic step: two concurrent submissions for the same target can
//! never both be accepted. Terminal job updates only apply to jobs that
//! are still `in_progress`, and any range change made alongside them
//! commits or rolls back with the job row.

use async_trait::async_trait;
use rangeforge_core::blueprint::Blueprint;
use rangeforge_core::error::CoreError;
use rangeforge_core::job::{Job, JobListQuery};
use rangeforge_core::range::Range;
use rangeforge_core::types::{BlueprintId, JobId, RangeId};

use crate::error::StoreResult;

#[async_trait]
pub trait BlueprintStore: Send + Sync {
    async fn insert_blueprint(&self, blueprint: &Blueprint) -> StoreResult<()>;

    async fn get_blueprint(&self, id: BlueprintId) -> StoreResult<Option<Blueprint>>;

    /// Blueprints owned by `owner`, newest first.
    async fn list_blueprints(&self, owner: &str) -> StoreResult<Vec<Blueprint>>;

    /// Returns `true` if a row was deleted.
    async fn delete_blueprint(&self, id: BlueprintId) -> StoreResult<bool>;
}

#[async_trait]
pub trait RangeStore: Send + Sync {
    async fn get_range(&self, id: RangeId) -> StoreResult<Option<Range>>;

    /// Ranges owned by `owner`, newest first.
    async fn list_ranges(&self, owner: &str) -> StoreResult<Vec<Range>>;

    /// Insert a new range row. Fails with a conflict if the identifier or
    /// the `owner/name` pair is taken.
    async fn insert_range(&self, range: &Range) -> StoreResult<()>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Enqueue a deploy job unless its target is held by an active job or
    /// an existing range.
    async fn admit_deploy(&self, job: &Job) -> StoreResult<()>;

    /// Enqueue a destroy job and move the range to `destroying`.
    ///
    /// Fails with not-found if the range is gone and with a conflict if it
    /// is not destroyable or another job holds its target.
    async fn admit_destroy(&self, job: &Job) -> StoreResult<()>;

    /// Claim the oldest queued job, moving it to `in_progress`.
    ///
    /// Each queued job is handed out at most once across all callers.
    async fn claim_next(&self) -> StoreResult<Option<Job>>;

    /// Count another attempt on an in-progress job. Returns the new count.
    async fn record_retry(&self, job_id: JobId) -> StoreResult<u32>;

    /// Store the ready range and complete its deploy job.
    async fn complete_deploy(&self, job_id: JobId, range: &Range) -> StoreResult<Job>;

    /// Delete the range and complete its destroy job.
    async fn complete_destroy(&self, job_id: JobId, range_id: RangeId) -> StoreResult<Job>;

    /// Fail an in-progress job, marking `errored_range` as `error` if given.
    async fn fail_job(
        &self,
        job_id: JobId,
        error: &str,
        errored_range: Option<RangeId>,
    ) -> StoreResult<Job>;

    async fn get_job(&self, id: JobId) -> StoreResult<Option<Job>>;

    /// Jobs owned by `owner`, newest first.
    async fn list_jobs(&self, owner: &str, query: &JobListQuery) -> StoreResult<Vec<Job>>;
}

/// Everything the service needs from a backend.
pub trait Store: BlueprintStore + RangeStore + JobStore {}

impl<T: BlueprintStore + RangeStore + JobStore> Store for T {}

pub(crate) fn active_job_conflict(target_key: &str, job_id: Option<JobId>) -> CoreError {
    match job_id {
        Some(id) => CoreError::Conflict(format!(
            "'{target_key}' is already targeted by active job {id}"
        )),
        None => CoreError::Conflict(format!(
            "'{target_key}' is already targeted by an active job"
        )),
    }
}

pub(crate) fn existing_range_conflict(name: &str, range_id: RangeId) -> CoreError {
    CoreError::Conflict(format!("Range '{name}' already exists ({range_id})"))
}

pub(crate) fn job_not_found(id: JobId) -> CoreError {
    CoreError::NotFound { entity: "Job", id }
}

pub(crate) fn range_not_found(id: RangeId) -> CoreError {
    CoreError::NotFound { entity: "Range", id }
}

pub(crate) fn wrong_kind(method: &str, job: &Job) -> CoreError {
    CoreError::Internal(format!("{method} called with a {} job ({})", job.kind, job.id))
}
