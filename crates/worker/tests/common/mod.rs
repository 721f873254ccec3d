//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rangeforge_core::blueprint::{
    Blueprint, BlueprintFeatures, CreateBlueprint, HostTemplate, SubnetTemplate, VpcTemplate,
};
use rangeforge_core::job::{Job, JobListQuery};
use rangeforge_core::range::Range;
use rangeforge_core::tags::Provider;
use rangeforge_core::types::{BlueprintId, JobId, RangeId};
use rangeforge_db::{
    BlueprintStore, JobStore, MemoryStore, RangeStore, Store, StoreError, StoreResult,
};
use rangeforge_provisioner::{
    DeployOutcome, DeployPlan, DestroyPlan, ProvisionError, ProvisionedHost, ProvisionedSubnet,
    ProvisionedVpc, Provisioner,
};
use rangeforge_worker::{JobExecutor, WorkerConfig};

/// How a scripted call behaves.
pub enum Step<T> {
    Return(Result<T, ProvisionError>),
    /// Never complete; the caller's timeout must fire.
    Hang,
}

/// Provisioner that replays queued responses, then succeeds.
#[derive(Default)]
pub struct ScriptedProvisioner {
    deploys: Mutex<VecDeque<Step<DeployOutcome>>>,
    destroys: Mutex<VecDeque<Step<()>>>,
    pub deploy_calls: AtomicU32,
    pub destroy_calls: AtomicU32,
    /// Artificial latency for every call.
    pub latency: Option<Duration>,
}

impl ScriptedProvisioner {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub fn push_deploy(&self, step: Step<DeployOutcome>) {
        self.deploys.lock().unwrap().push_back(step);
    }

    pub fn push_destroy(&self, step: Step<()>) {
        self.destroys.lock().unwrap().push_back(step);
    }

    pub fn deploy_calls(&self) -> u32 {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> u32 {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    async fn play<T>(&self, step: Option<Step<T>>, success: T) -> Result<T, ProvisionError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match step {
            None => Ok(success),
            Some(Step::Return(result)) => result,
            Some(Step::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    async fn deploy(&self, plan: &DeployPlan) -> Result<DeployOutcome, ProvisionError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.deploys.lock().unwrap().pop_front();
        self.play(step, outcome_for(plan)).await
    }

    async fn destroy(&self, _plan: &DestroyPlan) -> Result<(), ProvisionError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.destroys.lock().unwrap().pop_front();
        self.play(step, ()).await
    }
}

/// A successful outcome naming every entity in the plan.
pub fn outcome_for(plan: &DeployPlan) -> DeployOutcome {
    DeployOutcome {
        vpcs: plan
            .vpcs
            .iter()
            .map(|vpc| ProvisionedVpc {
                name: vpc.name.clone(),
                resource_id: format!("vpc-{}", vpc.name),
                subnets: vpc
                    .subnets
                    .iter()
                    .map(|subnet| ProvisionedSubnet {
                        name: subnet.name.clone(),
                        resource_id: format!("subnet-{}", subnet.name),
                        hosts: subnet
                            .hosts
                            .iter()
                            .map(|host| ProvisionedHost {
                                hostname: host.hostname.clone(),
                                resource_id: format!("i-{}", host.hostname),
                                ip_address: None,
                                status: None,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
        state: Some(serde_json::json!({"serial": 1})),
    }
}

pub fn valid_vpcs() -> Vec<VpcTemplate> {
    vec![VpcTemplate {
        name: "corp".into(),
        cidr: "10.0.0.0/16".into(),
        subnets: vec![SubnetTemplate {
            name: "dmz".into(),
            cidr: "10.0.1.0/24".into(),
            hosts: vec![HostTemplate {
                hostname: "web".into(),
                os: "ubuntu_22".into(),
                size: "small".into(),
                disk_gib: 20,
                tags: vec![],
            }],
        }],
    }]
}

pub fn blueprint_with(owner: &str, vpcs: Vec<VpcTemplate>) -> Blueprint {
    Blueprint::from_create(
        owner,
        CreateBlueprint {
            name: "lab".into(),
            description: None,
            provider: Provider::Aws,
            features: BlueprintFeatures::default(),
            vpcs,
        },
    )
}

pub async fn stored_blueprint(store: &MemoryStore, vpcs: Vec<VpcTemplate>) -> Blueprint {
    let bp = blueprint_with("alice", vpcs);
    store.insert_blueprint(&bp).await.unwrap();
    bp
}

/// Fast retries, generous timeout.
pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(50),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(10),
        provision_timeout: Duration::from_secs(60),
    }
}

pub fn executor(store: &MemoryStore, provisioner: &Arc<ScriptedProvisioner>) -> JobExecutor {
    let store: Arc<dyn Store> = Arc::new(store.clone());
    JobExecutor::new(store, provisioner.clone(), test_config())
}

// ---------------------------------------------------------------------------
// Store with injected database failures
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryStore`, failing the next N calls of selected
/// methods with a database error.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub get_blueprint_failures: AtomicU32,
    pub complete_deploy_failures: AtomicU32,
    pub complete_destroy_failures: AtomicU32,
    pub fail_job_failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    fn trip(counter: &AtomicU32) -> StoreResult<()> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl BlueprintStore for FlakyStore {
    async fn insert_blueprint(&self, blueprint: &Blueprint) -> StoreResult<()> {
        self.inner.insert_blueprint(blueprint).await
    }

    async fn get_blueprint(&self, id: BlueprintId) -> StoreResult<Option<Blueprint>> {
        Self::trip(&self.get_blueprint_failures)?;
        self.inner.get_blueprint(id).await
    }

    async fn list_blueprints(&self, owner: &str) -> StoreResult<Vec<Blueprint>> {
        self.inner.list_blueprints(owner).await
    }

    async fn delete_blueprint(&self, id: BlueprintId) -> StoreResult<bool> {
        self.inner.delete_blueprint(id).await
    }
}

#[async_trait]
impl RangeStore for FlakyStore {
    async fn get_range(&self, id: RangeId) -> StoreResult<Option<Range>> {
        self.inner.get_range(id).await
    }

    async fn list_ranges(&self, owner: &str) -> StoreResult<Vec<Range>> {
        self.inner.list_ranges(owner).await
    }

    async fn insert_range(&self, range: &Range) -> StoreResult<()> {
        self.inner.insert_range(range).await
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn admit_deploy(&self, job: &Job) -> StoreResult<()> {
        self.inner.admit_deploy(job).await
    }

    async fn admit_destroy(&self, job: &Job) -> StoreResult<()> {
        self.inner.admit_destroy(job).await
    }

    async fn claim_next(&self) -> StoreResult<Option<Job>> {
        self.inner.claim_next().await
    }

    async fn record_retry(&self, job_id: JobId) -> StoreResult<u32> {
        self.inner.record_retry(job_id).await
    }

    async fn complete_deploy(&self, job_id: JobId, range: &Range) -> StoreResult<Job> {
        Self::trip(&self.complete_deploy_failures)?;
        self.inner.complete_deploy(job_id, range).await
    }

    async fn complete_destroy(&self, job_id: JobId, range_id: RangeId) -> StoreResult<Job> {
        Self::trip(&self.complete_destroy_failures)?;
        self.inner.complete_destroy(job_id, range_id).await
    }

    async fn fail_job(
        &self,
        job_id: JobId,
        error: &str,
        errored_range: Option<RangeId>,
    ) -> StoreResult<Job> {
        Self::trip(&self.fail_job_failures)?;
        self.inner.fail_job(job_id, error, errored_range).await
    }

    async fn get_job(&self, id: JobId) -> StoreResult<Option<Job>> {
        self.inner.get_job(id).await
    }

    async fn list_jobs(&self, owner: &str, query: &JobListQuery) -> StoreResult<Vec<Job>> {
        self.inner.list_jobs(owner, query).await
    }
}

pub fn flaky_executor(store: &Arc<FlakyStore>, provisioner: &Arc<ScriptedProvisioner>) -> JobExecutor {
    JobExecutor::new(store.clone(), provisioner.clone(), test_config())
}
