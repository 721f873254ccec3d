//! Job records and the job state machine.
//!
//! ```text
//! queued --claim--> in_progress --success--> complete
//!                               --failure--> failed
//! ```
//!
//! `complete` and `failed` are terminal: no transition leaves them.
//! `not_found` is a lookup outcome for unknown identifiers, never a stored
//! status.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::range::{target_key, Range};
use crate::tags::Region;
use crate::types::{new_id, BlueprintId, JobId, Owner, RangeId, Timestamp};

define_tag_enum! {
    /// Persisted job status.
    JobStatus("job status") {
        Queued = "queued",
        InProgress = "in_progress",
        Complete = "complete",
        Failed = "failed",
    }
}

define_tag_enum! {
    /// What a job does to its range.
    JobKind("job kind") {
        Deploy = "deploy",
        Destroy = "destroy",
    }
}

/// Status string reported for identifiers that match no job.
pub const NOT_FOUND_STATUS: &str = "not_found";

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Complete)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }
}

/// DTO for `POST /api/v1/ranges/deploy`.
///
/// `region` stays a string here so an unknown region is rejected with a
/// validation error rather than a body parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub blueprint_id: BlueprintId,
    pub name: String,
    pub region: String,
    pub description: Option<String>,
}

/// Kind-specific parameters persisted with a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    Deploy {
        blueprint_id: BlueprintId,
        /// Identifier the range will be created under; assigned at
        /// submission so the result is known before provisioning starts.
        range_id: RangeId,
        name: String,
        region: Region,
        description: Option<String>,
    },
    Destroy {
        range_id: RangeId,
    },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Deploy { .. } => JobKind::Deploy,
            JobRequest::Destroy { .. } => JobKind::Destroy,
        }
    }

    pub fn range_id(&self) -> RangeId {
        match self {
            JobRequest::Deploy { range_id, .. } | JobRequest::Destroy { range_id } => *range_id,
        }
    }
}

/// A persisted unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: Owner,
    pub kind: JobKind,
    /// Admission key (`owner/range-name`) held while the job is active.
    pub target_key: String,
    pub request: JobRequest,
    /// Number of provisioning attempts made so far (0 while queued).
    pub attempt: u32,
    pub status: JobStatus,
    pub enqueued_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Returned by submission endpoints: the job to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl JobListQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Result payload of a completed deploy job.
pub fn deploy_result(range_id: RangeId) -> serde_json::Value {
    serde_json::json!({ "range_id": range_id })
}

impl Job {
    fn queued(owner: &str, target_key: String, request: JobRequest) -> Self {
        Self {
            id: new_id(),
            owner: owner.to_string(),
            kind: request.kind(),
            target_key,
            request,
            attempt: 0,
            status: JobStatus::Queued,
            enqueued_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// A queued deploy job for the prospective range `owner/name`.
    pub fn new_deploy(
        owner: &str,
        blueprint_id: BlueprintId,
        name: &str,
        region: Region,
        description: Option<String>,
    ) -> Self {
        Self::queued(
            owner,
            target_key(owner, name),
            JobRequest::Deploy {
                blueprint_id,
                range_id: new_id(),
                name: name.to_string(),
                region,
                description,
            },
        )
    }

    /// A queued destroy job for an existing range.
    pub fn new_destroy(owner: &str, range: &Range) -> Self {
        Self::queued(
            owner,
            range.target_key(),
            JobRequest::Destroy { range_id: range.id },
        )
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: self.id,
            status: self.status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The range identifier from a completed deploy's result payload.
    pub fn result_range_id(&self) -> Option<RangeId> {
        self.result
            .as_ref()?
            .get("range_id")?
            .as_str()?
            .parse()
            .ok()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Claim the job for execution: `queued -> in_progress`, first attempt.
    pub fn start(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::InProgress)?;
        self.started_at = Some(now);
        self.attempt = 1;
        Ok(())
    }

    /// Count another provisioning attempt. Only valid while in progress.
    pub fn record_retry(&mut self) -> Result<u32, CoreError> {
        if self.status != JobStatus::InProgress {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: JobStatus::InProgress,
            });
        }
        self.attempt += 1;
        Ok(self.attempt)
    }

    pub fn complete(&mut self, result: serde_json::Value, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Complete)?;
        self.result = Some(result);
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        Ok(())
    }
}

/// Outcome of looking a job up by identifier.
///
/// Serializes as the job itself, or as `{"id": ..., "status": "not_found"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobLookup {
    Found(Box<Job>),
    NotFound(MissingJob),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingJob {
    pub id: JobId,
    pub status: MissingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingStatus {
    #[serde(rename = "not_found")]
    NotFound,
}

impl JobLookup {
    pub fn not_found(id: JobId) -> Self {
        JobLookup::NotFound(MissingJob {
            id,
            status: MissingStatus::NotFound,
        })
    }

    /// The status label a polling client should display.
    pub fn status_label(&self) -> &'static str {
        match self {
            JobLookup::Found(job) => job.status.as_str(),
            JobLookup::NotFound(_) => NOT_FOUND_STATUS,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn deploy_job() -> Job {
        Job::new_deploy("alice", new_id(), "r1", Region::UsEast1, None)
    }

    #[test]
    fn new_deploy_job_is_queued_with_target_key() {
        let job = deploy_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.kind, JobKind::Deploy);
        assert_eq!(job.target_key, "alice/r1");
        assert_eq!(job.attempt, 0);
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn happy_path_sets_timestamps_and_result() {
        let mut job = deploy_job();
        let now = chrono::Utc::now();
        job.start(now).unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.started_at, Some(now));
        assert_eq!(job.attempt, 1);

        let range_id = job.request.range_id();
        job.complete(deploy_result(range_id), now).unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.finished_at, Some(now));
        assert_eq!(job.result_range_id(), Some(range_id));
    }

    #[test]
    fn queued_job_cannot_skip_to_terminal() {
        let mut job = deploy_job();
        assert_matches!(
            job.complete(serde_json::json!({}), chrono::Utc::now()),
            Err(CoreError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Complete
            })
        );
        assert_matches!(
            job.fail("boom", chrono::Utc::now()),
            Err(CoreError::InvalidTransition { .. })
        );
    }

    #[test]
    fn terminal_jobs_are_immutable() {
        let mut job = deploy_job();
        job.start(chrono::Utc::now()).unwrap();
        job.fail("provisioner exploded", chrono::Utc::now()).unwrap();

        let snapshot = job.clone();
        assert!(job.complete(serde_json::json!({}), chrono::Utc::now()).is_err());
        assert!(job.start(chrono::Utc::now()).is_err());
        assert!(job.record_retry().is_err());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn retries_count_in_place() {
        let mut job = deploy_job();
        job.start(chrono::Utc::now()).unwrap();
        assert_eq!(job.record_retry().unwrap(), 2);
        assert_eq!(job.record_retry().unwrap(), 3);
        assert_eq!(job.attempt, 3);
    }

    #[test]
    fn every_edge_is_forward() {
        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                if from.can_transition_to(*to) {
                    assert!(!from.is_terminal(), "{from} must not have outgoing edges");
                }
            }
        }
    }

    #[test]
    fn list_query_limits_are_clamped() {
        let q = JobListQuery {
            limit: Some(1000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), MAX_LIMIT);
        assert_eq!(q.effective_offset(), 0);
        assert_eq!(JobListQuery::default().effective_limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn lookup_serializes_not_found_shape() {
        let id = new_id();
        let value = serde_json::to_value(JobLookup::not_found(id)).unwrap();
        assert_eq!(value["status"], "not_found");
        assert_eq!(value["id"], id.to_string());

        let back: JobLookup = serde_json::from_value(value).unwrap();
        assert_eq!(back.status_label(), NOT_FOUND_STATUS);
    }

    #[test]
    fn lookup_deserializes_a_found_job() {
        let job = deploy_job();
        let value = serde_json::to_value(&job).unwrap();
        let lookup: JobLookup = serde_json::from_value(value).unwrap();
        assert_matches!(lookup, JobLookup::Found(found) if found.id == job.id);
    }
}
