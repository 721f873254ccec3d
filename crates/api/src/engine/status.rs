//! Read side of the job lifecycle.

use std::sync::Arc;

use rangeforge_core::job::{Job, JobListQuery, JobLookup};
use rangeforge_core::types::JobId;
use rangeforge_db::{Store, StoreResult};

pub struct StatusService {
    store: Arc<dyn Store>,
}

impl StatusService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Snapshot of one job. Jobs owned by someone else are reported as
    /// not found, the same as unknown identifiers.
    pub async fn get_job(&self, owner: &str, job_id: JobId) -> StoreResult<JobLookup> {
        let lookup = match self.store.get_job(job_id).await? {
            Some(job) if job.owner == owner => JobLookup::Found(Box::new(job)),
            _ => JobLookup::not_found(job_id),
        };
        Ok(lookup)
    }

    /// `owner`'s jobs, newest first.
    pub async fn list_jobs(&self, owner: &str, query: &JobListQuery) -> StoreResult<Vec<Job>> {
        self.store.list_jobs(owner, query).await
    }
}
