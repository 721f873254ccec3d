//! Row structs for the PostgreSQL backend and their mapping to the domain
//! model. Closed vocabularies are stored as TEXT and parsed on the way out.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rangeforge_core::blueprint::{Blueprint, BlueprintFeatures, VpcTemplate};
use rangeforge_core::job::{Job, JobRequest};
use rangeforge_core::range::{DeployedVpc, Range};
use rangeforge_core::tags::UnknownTag;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;

pub(crate) const BLUEPRINT_COLUMNS: &str =
    "id, owner, name, description, provider, features, vpcs, created_at";

pub(crate) const RANGE_COLUMNS: &str = "\
    id, owner, name, description, blueprint_id, provider, region, features, \
    status, vpcs, provisioner_state, created_at, updated_at";

pub(crate) const JOB_COLUMNS: &str = "\
    id, owner, kind, target_key, request, attempt, status, \
    enqueued_at, started_at, finished_at, result, error_message";

fn parse_tag<T>(entity: &'static str, id: Uuid, raw: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownTag>,
{
    raw.parse().map_err(|e: UnknownTag| StoreError::Corrupt {
        entity,
        id,
        reason: e.to_string(),
    })
}

#[derive(Debug, FromRow)]
pub(crate) struct BlueprintRow {
    id: Uuid,
    owner: String,
    name: String,
    description: Option<String>,
    provider: String,
    features: Json<BlueprintFeatures>,
    vpcs: Json<Vec<VpcTemplate>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BlueprintRow> for Blueprint {
    type Error = StoreError;

    fn try_from(row: BlueprintRow) -> Result<Self, Self::Error> {
        Ok(Blueprint {
            id: row.id,
            provider: parse_tag("blueprint", row.id, &row.provider)?,
            owner: row.owner,
            name: row.name,
            description: row.description,
            features: row.features.0,
            vpcs: row.vpcs.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RangeRow {
    id: Uuid,
    owner: String,
    name: String,
    description: Option<String>,
    blueprint_id: Uuid,
    provider: String,
    region: String,
    features: Json<BlueprintFeatures>,
    status: String,
    vpcs: Json<Vec<DeployedVpc>>,
    provisioner_state: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RangeRow> for Range {
    type Error = StoreError;

    fn try_from(row: RangeRow) -> Result<Self, Self::Error> {
        Ok(Range {
            id: row.id,
            provider: parse_tag("range", row.id, &row.provider)?,
            region: parse_tag("range", row.id, &row.region)?,
            status: parse_tag("range", row.id, &row.status)?,
            owner: row.owner,
            name: row.name,
            description: row.description,
            blueprint_id: row.blueprint_id,
            features: row.features.0,
            vpcs: row.vpcs.0,
            provisioner_state: row.provisioner_state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct JobRow {
    id: Uuid,
    owner: String,
    kind: String,
    target_key: String,
    request: Json<JobRequest>,
    attempt: i32,
    status: String,
    enqueued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            kind: parse_tag("job", row.id, &row.kind)?,
            status: parse_tag("job", row.id, &row.status)?,
            attempt: u32::try_from(row.attempt).map_err(|e| StoreError::Corrupt {
                entity: "job",
                id: row.id,
                reason: e.to_string(),
            })?,
            owner: row.owner,
            target_key: row.target_key,
            request: row.request.0,
            enqueued_at: row.enqueued_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            result: row.result,
            error: row.error_message,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
