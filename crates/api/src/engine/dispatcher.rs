//! Job admission.
//!
//! Submissions are checked against the caller's view of the data, turned
//! into queued jobs, and handed to the store, which enforces the
//! one-active-job-per-target rule atomically. Nothing here waits on
//! provisioning.

use std::sync::Arc;

use rangeforge_core::error::CoreError;
use rangeforge_core::job::{DeployRequest, Job, JobHandle};
use rangeforge_core::tags::{allowed_values, Region};
use rangeforge_core::types::RangeId;
use rangeforge_core::validation::validate_range_name;
use rangeforge_db::{Store, StoreResult};
use rangeforge_worker::WorkSignal;

pub struct Dispatcher {
    store: Arc<dyn Store>,
    signal: WorkSignal,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, signal: WorkSignal) -> Self {
        Self { store, signal }
    }

    /// Queue a deploy of `request.blueprint_id` as the range `owner/name`.
    pub async fn submit_deploy(&self, owner: &str, request: DeployRequest) -> StoreResult<JobHandle> {
        let name = request.name.trim();
        validate_range_name(name).map_err(CoreError::Validation)?;
        let region = parse_region(&request.region)?;

        let blueprint = self
            .store
            .get_blueprint(request.blueprint_id)
            .await?
            .filter(|bp| bp.owner == owner)
            .ok_or(CoreError::NotFound {
                entity: "Blueprint",
                id: request.blueprint_id,
            })?;

        let description = request.description.filter(|d| !d.trim().is_empty());
        let job = Job::new_deploy(owner, blueprint.id, name, region, description);
        self.store.admit_deploy(&job).await?;
        self.signal.notify();

        tracing::info!(
            job_id = %job.id,
            range_id = %job.request.range_id(),
            blueprint_id = %blueprint.id,
            target = %job.target_key,
            %region,
            "Deploy job queued",
        );
        Ok(job.handle())
    }

    /// Queue teardown of one of `owner`'s ranges.
    pub async fn submit_destroy(&self, owner: &str, range_id: RangeId) -> StoreResult<JobHandle> {
        let range = self
            .store
            .get_range(range_id)
            .await?
            .filter(|r| r.owner == owner)
            .ok_or(CoreError::NotFound {
                entity: "Range",
                id: range_id,
            })?;
        range.ensure_destroyable()?;

        let job = Job::new_destroy(owner, &range);
        self.store.admit_destroy(&job).await?;
        self.signal.notify();

        tracing::info!(
            job_id = %job.id,
            range_id = %range_id,
            target = %job.target_key,
            "Destroy job queued",
        );
        Ok(job.handle())
    }
}

fn parse_region(raw: &str) -> Result<Region, CoreError> {
    raw.trim().parse().map_err(|e| {
        CoreError::InvalidInput(format!(
            "{e}; expected one of: {}",
            allowed_values(Region::ALL)
        ))
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rangeforge_core::blueprint::{
        Blueprint, CreateBlueprint, HostTemplate, SubnetTemplate, VpcTemplate,
    };
    use rangeforge_core::job::{JobKind, JobStatus};
    use rangeforge_core::range::{Range, RangeStatus};
    use rangeforge_core::tags::Provider;
    use rangeforge_core::types::new_id;
    use rangeforge_db::{BlueprintStore, JobStore, MemoryStore, RangeStore, StoreError};

    use super::*;

    fn blueprint(owner: &str) -> Blueprint {
        Blueprint::from_create(
            owner,
            CreateBlueprint {
                name: "lab".into(),
                description: None,
                provider: Provider::Aws,
                features: Default::default(),
                vpcs: vec![VpcTemplate {
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
                }],
            },
        )
    }

    async fn setup() -> (MemoryStore, Dispatcher, Blueprint) {
        let store = MemoryStore::new();
        let bp = blueprint("alice");
        store.insert_blueprint(&bp).await.unwrap();
        let dispatcher = Dispatcher::new(Arc::new(store.clone()), WorkSignal::new());
        (store, dispatcher, bp)
    }

    fn deploy(bp: &Blueprint, name: &str, region: &str) -> DeployRequest {
        DeployRequest {
            blueprint_id: bp.id,
            name: name.into(),
            region: region.into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn deploy_is_queued_under_the_trimmed_name() {
        let (store, dispatcher, bp) = setup().await;

        let handle = dispatcher
            .submit_deploy("alice", deploy(&bp, "  r1 ", "us-west-2"))
            .await
            .unwrap();
        assert_eq!(handle.status, JobStatus::Queued);

        let job = store.get_job(handle.job_id).await.unwrap().unwrap();
        assert_eq!(job.kind, JobKind::Deploy);
        assert_eq!(job.target_key, "alice/r1");
    }

    #[tokio::test]
    async fn unknown_region_lists_the_allowed_set() {
        let (_, dispatcher, bp) = setup().await;

        let err = dispatcher
            .submit_deploy("alice", deploy(&bp, "r1", "mars-north-1"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::Core(CoreError::InvalidInput(msg)) if msg.contains("us-east-1")
        );
    }

    #[tokio::test]
    async fn empty_name_is_a_validation_error() {
        let (_, dispatcher, bp) = setup().await;

        let err = dispatcher
            .submit_deploy("alice", deploy(&bp, "   ", "us-east-1"))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn another_owners_blueprint_is_not_found() {
        let (_, dispatcher, bp) = setup().await;

        let err = dispatcher
            .submit_deploy("mallory", deploy(&bp, "r1", "us-east-1"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::Core(CoreError::NotFound { entity: "Blueprint", .. })
        );
    }

    #[tokio::test]
    async fn second_deploy_of_an_active_target_conflicts() {
        let (_, dispatcher, bp) = setup().await;

        let first = dispatcher
            .submit_deploy("alice", deploy(&bp, "r1", "us-east-1"))
            .await
            .unwrap();
        let err = dispatcher
            .submit_deploy("alice", deploy(&bp, "r1", "eu-west-1"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::Core(CoreError::Conflict(msg)) if msg.contains(&first.job_id.to_string())
        );
    }

    #[tokio::test]
    async fn destroying_a_building_range_conflicts() {
        let (store, dispatcher, bp) = setup().await;
        let range = Range::building(
            new_id(),
            "alice",
            "r1",
            None,
            &bp,
            Region::UsEast1,
        );
        store.insert_range(&range).await.unwrap();

        let err = dispatcher.submit_destroy("alice", range.id).await.unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::Conflict(_)));
        assert_eq!(
            store.get_range(range.id).await.unwrap().unwrap().status,
            RangeStatus::Building
        );
    }

    #[tokio::test]
    async fn destroy_of_another_owners_range_is_not_found() {
        let (store, dispatcher, bp) = setup().await;
        let range = Range::building(
            new_id(),
            "alice",
            "r1",
            None,
            &bp,
            Region::UsEast1,
        )
        .into_ready(vec![], None);
        store.insert_range(&range).await.unwrap();

        let err = dispatcher
            .submit_destroy("mallory", range.id)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::Core(CoreError::NotFound { entity: "Range", .. })
        );
    }
}
