//! In-process store.
//!
//! All tables sit behind one lock so that admission checks and the writes
//! they guard are a single critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rangeforge_core::blueprint::Blueprint;
use rangeforge_core::job::{deploy_result, Job, JobListQuery, JobRequest, JobStatus};
use rangeforge_core::range::{Range, RangeStatus};
use rangeforge_core::types::{BlueprintId, JobId, RangeId};
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::store::{
    active_job_conflict, existing_range_conflict, job_not_found, range_not_found, wrong_kind,
    BlueprintStore, JobStore, RangeStore,
};

#[derive(Default)]
struct Tables {
    blueprints: HashMap<BlueprintId, Blueprint>,
    ranges: HashMap<RangeId, Range>,
    jobs: HashMap<JobId, Job>,
    /// Queued job ids in submission order.
    queue: VecDeque<JobId>,
}

impl Tables {
    fn active_job_for(&self, target_key: &str) -> Option<JobId> {
        self.jobs
            .values()
            .find(|j| j.target_key == target_key && !j.is_terminal())
            .map(|j| j.id)
    }

    fn range_named(&self, owner: &str, name: &str) -> Option<RangeId> {
        self.ranges
            .values()
            .find(|r| r.owner == owner && r.name == name)
            .map(|r| r.id)
    }

    fn job_snapshot(&self, id: JobId) -> StoreResult<Job> {
        self.jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| job_not_found(id).into())
    }

    fn enqueue(&mut self, job: &Job) {
        self.queue.push_back(job.id);
        self.jobs.insert(job.id, job.clone());
    }
}

/// Store backed by process memory. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlueprintStore for MemoryStore {
    async fn insert_blueprint(&self, blueprint: &Blueprint) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.blueprints.insert(blueprint.id, blueprint.clone());
        Ok(())
    }

    async fn get_blueprint(&self, id: BlueprintId) -> StoreResult<Option<Blueprint>> {
        Ok(self.tables.read().await.blueprints.get(&id).cloned())
    }

    async fn list_blueprints(&self, owner: &str) -> StoreResult<Vec<Blueprint>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Blueprint> = tables
            .blueprints
            .values()
            .filter(|b| b.owner == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn delete_blueprint(&self, id: BlueprintId) -> StoreResult<bool> {
        Ok(self.tables.write().await.blueprints.remove(&id).is_some())
    }
}

#[async_trait]
impl RangeStore for MemoryStore {
    async fn get_range(&self, id: RangeId) -> StoreResult<Option<Range>> {
        Ok(self.tables.read().await.ranges.get(&id).cloned())
    }

    async fn list_ranges(&self, owner: &str) -> StoreResult<Vec<Range>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Range> = tables
            .ranges
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn insert_range(&self, range: &Range) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.range_named(&range.owner, &range.name) {
            return Err(existing_range_conflict(&range.name, existing).into());
        }
        if tables.ranges.contains_key(&range.id) {
            return Err(existing_range_conflict(&range.name, range.id).into());
        }
        tables.ranges.insert(range.id, range.clone());
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn admit_deploy(&self, job: &Job) -> StoreResult<()> {
        let JobRequest::Deploy { name, .. } = &job.request else {
            return Err(wrong_kind("admit_deploy", job).into());
        };
        let mut tables = self.tables.write().await;
        if let Some(active) = tables.active_job_for(&job.target_key) {
            return Err(active_job_conflict(&job.target_key, Some(active)).into());
        }
        if let Some(existing) = tables.range_named(&job.owner, name) {
            return Err(existing_range_conflict(name, existing).into());
        }
        tables.enqueue(job);
        Ok(())
    }

    async fn admit_destroy(&self, job: &Job) -> StoreResult<()> {
        let JobRequest::Destroy { range_id } = job.request else {
            return Err(wrong_kind("admit_destroy", job).into());
        };
        let mut tables = self.tables.write().await;
        let range = tables
            .ranges
            .get(&range_id)
            .ok_or_else(|| range_not_found(range_id))?;
        range.ensure_destroyable()?;
        if let Some(active) = tables.active_job_for(&job.target_key) {
            return Err(active_job_conflict(&job.target_key, Some(active)).into());
        }
        if let Some(range) = tables.ranges.get_mut(&range_id) {
            range.status = RangeStatus::Destroying;
            range.updated_at = Utc::now();
        }
        tables.enqueue(job);
        Ok(())
    }

    async fn claim_next(&self) -> StoreResult<Option<Job>> {
        let mut tables = self.tables.write().await;
        while let Some(id) = tables.queue.pop_front() {
            if let Some(job) = tables.jobs.get_mut(&id) {
                if job.status == JobStatus::Queued {
                    job.start(Utc::now())?;
                    return Ok(Some(job.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn record_retry(&self, job_id: JobId) -> StoreResult<u32> {
        let mut tables = self.tables.write().await;
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| job_not_found(job_id))?;
        Ok(job.record_retry()?)
    }

    async fn complete_deploy(&self, job_id: JobId, range: &Range) -> StoreResult<Job> {
        let mut tables = self.tables.write().await;
        let mut job = tables.job_snapshot(job_id)?;
        job.complete(deploy_result(range.id), Utc::now())?;
        tables.ranges.insert(range.id, range.clone());
        tables.jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn complete_destroy(&self, job_id: JobId, range_id: RangeId) -> StoreResult<Job> {
        let mut tables = self.tables.write().await;
        let mut job = tables.job_snapshot(job_id)?;
        job.complete(serde_json::json!({}), Utc::now())?;
        tables.ranges.remove(&range_id);
        tables.jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn fail_job(
        &self,
        job_id: JobId,
        error: &str,
        errored_range: Option<RangeId>,
    ) -> StoreResult<Job> {
        let mut tables = self.tables.write().await;
        let mut job = tables.job_snapshot(job_id)?;
        let now = Utc::now();
        job.fail(error, now)?;
        if let Some(range) = errored_range.and_then(|id| tables.ranges.get_mut(&id)) {
            range.status = RangeStatus::Error;
            range.updated_at = now;
        }
        tables.jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> StoreResult<Option<Job>> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, owner: &str, query: &JobListQuery) -> StoreResult<Vec<Job>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| j.owner == owner)
            .filter(|j| query.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at).then(b.id.cmp(&a.id)));
        let offset = usize::try_from(query.effective_offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.effective_limit()).unwrap_or(usize::MAX);
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }
}
