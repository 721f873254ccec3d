//! PostgreSQL store.
//!
//! Admission relies on two constraints from the initial migration:
//! `uq_jobs_active_target` (one queued/in-progress job per target key) and
//! `uq_ranges_owner_name`. Workers claim with `FOR UPDATE SKIP LOCKED`, so
//! any number of worker processes can share one database.

use async_trait::async_trait;
use rangeforge_core::blueprint::Blueprint;
use rangeforge_core::error::CoreError;
use rangeforge_core::job::{deploy_result, Job, JobListQuery, JobRequest, JobStatus};
use rangeforge_core::range::{Range, RangeStatus};
use rangeforge_core::types::{BlueprintId, JobId, RangeId};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::error::{StoreError, StoreResult};
use crate::rows::{
    convert_all, BlueprintRow, JobRow, RangeRow, BLUEPRINT_COLUMNS, JOB_COLUMNS, RANGE_COLUMNS,
};
use crate::store::{
    active_job_conflict, existing_range_conflict, job_not_found, range_not_found, wrong_kind,
    BlueprintStore, JobStore, RangeStore,
};

const ACTIVE_TARGET_INDEX: &str = "uq_jobs_active_target";
const RANGE_NAME_CONSTRAINT: &str = "uq_ranges_owner_name";

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(UNIQUE_VIOLATION) && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Build the conflict error for a target whose active-job index fired.
    async fn active_conflict(&self, target_key: &str) -> StoreError {
        let holder: Result<Option<JobId>, sqlx::Error> = sqlx::query_scalar(
            "SELECT id FROM jobs WHERE target_key = $1 AND status IN ($2, $3) LIMIT 1",
        )
        .bind(target_key)
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::InProgress.as_str())
        .fetch_optional(&self.pool)
        .await;
        match holder {
            Ok(id) => active_job_conflict(target_key, id).into(),
            Err(e) => e.into(),
        }
    }
}

async fn insert_job(conn: &mut PgConnection, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO jobs \
             (id, owner, kind, target_key, request, attempt, status, enqueued_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(job.id)
    .bind(&job.owner)
    .bind(job.kind.as_str())
    .bind(&job.target_key)
    .bind(Json(&job.request))
    .bind(i32::try_from(job.attempt).unwrap_or(i32::MAX))
    .bind(job.status.as_str())
    .bind(job.enqueued_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Error for a conditional update on `jobs` that matched no row.
async fn transition_error(
    conn: &mut PgConnection,
    job_id: JobId,
    to: JobStatus,
) -> StoreResult<StoreError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(conn)
        .await?;
    let Some(status) = status else {
        return Ok(job_not_found(job_id).into());
    };
    let from: JobStatus = status.parse().map_err(|e: rangeforge_core::tags::UnknownTag| {
        StoreError::Corrupt {
            entity: "job",
            id: job_id,
            reason: e.to_string(),
        }
    })?;
    Ok(CoreError::InvalidTransition { from, to }.into())
}

/// Move an in-progress job to a terminal status.
async fn finish_job(
    conn: &mut PgConnection,
    job_id: JobId,
    status: JobStatus,
    result: Option<&serde_json::Value>,
    error: Option<&str>,
) -> StoreResult<Job> {
    let query = format!(
        "UPDATE jobs \
         SET status = $2, result = $3, error_message = $4, finished_at = NOW() \
         WHERE id = $1 AND status = $5 \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query_as::<_, JobRow>(&query)
        .bind(job_id)
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .bind(JobStatus::InProgress.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => row.try_into(),
        None => Err(transition_error(conn, job_id, status).await?),
    }
}

// ---------------------------------------------------------------------------
// Blueprints
// ---------------------------------------------------------------------------

#[async_trait]
impl BlueprintStore for PgStore {
    async fn insert_blueprint(&self, blueprint: &Blueprint) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO blueprints \
                 (id, owner, name, description, provider, features, vpcs, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(blueprint.id)
        .bind(&blueprint.owner)
        .bind(&blueprint.name)
        .bind(&blueprint.description)
        .bind(blueprint.provider.as_str())
        .bind(Json(&blueprint.features))
        .bind(Json(&blueprint.vpcs))
        .bind(blueprint.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_blueprint(&self, id: BlueprintId) -> StoreResult<Option<Blueprint>> {
        let query = format!("SELECT {BLUEPRINT_COLUMNS} FROM blueprints WHERE id = $1");
        let row = sqlx::query_as::<_, BlueprintRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Blueprint::try_from).transpose()
    }

    async fn list_blueprints(&self, owner: &str) -> StoreResult<Vec<Blueprint>> {
        let query = format!(
            "SELECT {BLUEPRINT_COLUMNS} FROM blueprints \
             WHERE owner = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, BlueprintRow>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn delete_blueprint(&self, id: BlueprintId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM blueprints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

#[async_trait]
impl RangeStore for PgStore {
    async fn get_range(&self, id: RangeId) -> StoreResult<Option<Range>> {
        let query = format!("SELECT {RANGE_COLUMNS} FROM ranges WHERE id = $1");
        let row = sqlx::query_as::<_, RangeRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Range::try_from).transpose()
    }

    async fn list_ranges(&self, owner: &str) -> StoreResult<Vec<Range>> {
        let query = format!(
            "SELECT {RANGE_COLUMNS} FROM ranges \
             WHERE owner = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RangeRow>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn insert_range(&self, range: &Range) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO ranges \
                 (id, owner, name, description, blueprint_id, provider, region, features, \
                  status, vpcs, provisioner_state, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(range.id)
        .bind(&range.owner)
        .bind(&range.name)
        .bind(&range.description)
        .bind(range.blueprint_id)
        .bind(range.provider.as_str())
        .bind(range.region.as_str())
        .bind(Json(&range.features))
        .bind(range.status.as_str())
        .bind(Json(&range.vpcs))
        .bind(&range.provisioner_state)
        .bind(range.created_at)
        .bind(range.updated_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e, RANGE_NAME_CONSTRAINT) => {
                let existing: Option<RangeId> =
                    sqlx::query_scalar("SELECT id FROM ranges WHERE owner = $1 AND name = $2")
                        .bind(&range.owner)
                        .bind(&range.name)
                        .fetch_optional(&self.pool)
                        .await?;
                Err(existing_range_conflict(&range.name, existing.unwrap_or(range.id)).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[async_trait]
impl JobStore for PgStore {
    async fn admit_deploy(&self, job: &Job) -> StoreResult<()> {
        let JobRequest::Deploy { name, .. } = &job.request else {
            return Err(wrong_kind("admit_deploy", job).into());
        };
        let mut tx = self.pool.begin().await?;

        let existing: Option<RangeId> =
            sqlx::query_scalar("SELECT id FROM ranges WHERE owner = $1 AND name = $2")
                .bind(&job.owner)
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(range_id) = existing {
            return Err(existing_range_conflict(name, range_id).into());
        }

        match insert_job(&mut tx, job).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e, ACTIVE_TARGET_INDEX) => {
                tx.rollback().await?;
                return Err(self.active_conflict(&job.target_key).await);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    async fn admit_destroy(&self, job: &Job) -> StoreResult<()> {
        let JobRequest::Destroy { range_id } = job.request else {
            return Err(wrong_kind("admit_destroy", job).into());
        };
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {RANGE_COLUMNS} FROM ranges WHERE id = $1 FOR UPDATE");
        let range: Range = sqlx::query_as::<_, RangeRow>(&query)
            .bind(range_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| range_not_found(range_id))?
            .try_into()?;
        range.ensure_destroyable()?;

        match insert_job(&mut tx, job).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e, ACTIVE_TARGET_INDEX) => {
                tx.rollback().await?;
                return Err(self.active_conflict(&job.target_key).await);
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query("UPDATE ranges SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(range_id)
            .bind(RangeStatus::Destroying.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn claim_next(&self) -> StoreResult<Option<Job>> {
        let query = format!(
            "UPDATE jobs \
             SET status = $1, started_at = NOW(), attempt = 1 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = $2 \
                 ORDER BY enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::InProgress.as_str())
            .bind(JobStatus::Queued.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn record_retry(&self, job_id: JobId) -> StoreResult<u32> {
        let mut conn = self.pool.acquire().await?;
        let attempt: Option<i32> = sqlx::query_scalar(
            "UPDATE jobs SET attempt = attempt + 1 \
             WHERE id = $1 AND status = $2 \
             RETURNING attempt",
        )
        .bind(job_id)
        .bind(JobStatus::InProgress.as_str())
        .fetch_optional(&mut *conn)
        .await?;
        match attempt {
            Some(n) => Ok(u32::try_from(n).unwrap_or(0)),
            None => Err(transition_error(&mut conn, job_id, JobStatus::InProgress).await?),
        }
    }

    async fn complete_deploy(&self, job_id: JobId, range: &Range) -> StoreResult<Job> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE ranges \
             SET status = $2, vpcs = $3, provisioner_state = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(range.id)
        .bind(range.status.as_str())
        .bind(Json(&range.vpcs))
        .bind(&range.provisioner_state)
        .bind(range.updated_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(range_not_found(range.id).into());
        }

        let result = deploy_result(range.id);
        let job = finish_job(&mut tx, job_id, JobStatus::Complete, Some(&result), None).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn complete_destroy(&self, job_id: JobId, range_id: RangeId) -> StoreResult<Job> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ranges WHERE id = $1")
            .bind(range_id)
            .execute(&mut *tx)
            .await?;

        let result = serde_json::json!({});
        let job = finish_job(&mut tx, job_id, JobStatus::Complete, Some(&result), None).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn fail_job(
        &self,
        job_id: JobId,
        error: &str,
        errored_range: Option<RangeId>,
    ) -> StoreResult<Job> {
        let mut tx = self.pool.begin().await?;

        if let Some(range_id) = errored_range {
            sqlx::query("UPDATE ranges SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(range_id)
                .bind(RangeStatus::Error.as_str())
                .execute(&mut *tx)
                .await?;
        }

        let job = finish_job(&mut tx, job_id, JobStatus::Failed, None, Some(error)).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> StoreResult<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn list_jobs(&self, owner: &str, query: &JobListQuery) -> StoreResult<Vec<Job>> {
        let status_clause = if query.status.is_some() {
            "AND status = $4"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE owner = $1 {status_clause} \
             ORDER BY enqueued_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );

        let mut q = sqlx::query_as::<_, JobRow>(&sql)
            .bind(owner)
            .bind(query.effective_limit())
            .bind(query.effective_offset());
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }

        let rows = q.fetch_all(&self.pool).await?;
        convert_all(rows)
    }
}
