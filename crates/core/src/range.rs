//! Deployed ranges: the live counterpart of a blueprint.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::blueprint::{Blueprint, BlueprintFeatures};
use crate::error::CoreError;
use crate::tags::{Provider, Region};
use crate::types::{BlueprintId, Owner, RangeId, Timestamp};

define_tag_enum! {
    /// Overall range lifecycle status.
    RangeStatus("range status") {
        /// A deploy job is provisioning resources.
        Building = "building",
        Ready = "ready",
        /// Provisioning or teardown failed; needs a destroy to reconcile.
        Error = "error",
        /// A destroy job is tearing resources down.
        Destroying = "destroying",
    }
}

define_tag_enum! {
    /// Runtime status reported for a deployed host.
    HostStatus("host status") {
        Running = "running",
        Stopped = "stopped",
        Unknown = "unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedHost {
    pub hostname: String,
    pub os: String,
    pub size: String,
    pub disk_gib: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub resource_id: String,
    pub status: HostStatus,
    pub ip_address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedSubnet {
    pub name: String,
    pub cidr: String,
    pub resource_id: String,
    pub hosts: Vec<DeployedHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedVpc {
    pub name: String,
    pub cidr: String,
    pub resource_id: String,
    pub subnets: Vec<DeployedSubnet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Range {
    pub id: RangeId,
    pub owner: Owner,
    pub name: String,
    pub description: Option<String>,
    pub blueprint_id: BlueprintId,
    pub provider: Provider,
    pub region: Region,
    pub features: BlueprintFeatures,
    pub status: RangeStatus,
    pub vpcs: Vec<DeployedVpc>,
    /// Opaque state document handed back by the provisioner on deploy and
    /// handed to it again on destroy.
    pub provisioner_state: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The admission key for a range, existing or prospective.
///
/// Two jobs holding the same key can never be active at the same time.
pub fn target_key(owner: &str, name: &str) -> String {
    format!("{owner}/{name}")
}

impl Range {
    /// A placeholder range inserted by a deploy job before provisioning
    /// starts, so partial state is never lost if provisioning fails.
    pub fn building(
        id: RangeId,
        owner: &str,
        name: &str,
        description: Option<String>,
        blueprint: &Blueprint,
        region: Region,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            owner: owner.to_string(),
            name: name.to_string(),
            description,
            blueprint_id: blueprint.id,
            provider: blueprint.provider,
            region,
            features: blueprint.features,
            status: RangeStatus::Building,
            vpcs: Vec::new(),
            provisioner_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Consume a building range and produce its ready form.
    pub fn into_ready(
        mut self,
        vpcs: Vec<DeployedVpc>,
        provisioner_state: Option<serde_json::Value>,
    ) -> Self {
        self.status = RangeStatus::Ready;
        self.vpcs = vpcs;
        self.provisioner_state = provisioner_state;
        self.updated_at = chrono::Utc::now();
        self
    }

    pub fn target_key(&self) -> String {
        target_key(&self.owner, &self.name)
    }

    /// Every provider resource identifier recorded for this range, VPCs
    /// first, then subnets, then hosts.
    pub fn resource_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for vpc in &self.vpcs {
            ids.push(vpc.resource_id.clone());
        }
        for subnet in self.vpcs.iter().flat_map(|v| &v.subnets) {
            ids.push(subnet.resource_id.clone());
        }
        for host in self
            .vpcs
            .iter()
            .flat_map(|v| &v.subnets)
            .flat_map(|s| &s.hosts)
        {
            ids.push(host.resource_id.clone());
        }
        ids.retain(|id| !id.is_empty());
        ids
    }

    pub fn host_count(&self) -> usize {
        self.vpcs
            .iter()
            .flat_map(|v| &v.subnets)
            .map(|s| s.hosts.len())
            .sum()
    }

    /// Check that a destroy may be admitted for this range.
    ///
    /// `ready` ranges and `error` ranges (which need reconciling) may be
    /// destroyed; a range owned by an in-flight job may not.
    pub fn ensure_destroyable(&self) -> Result<(), CoreError> {
        match self.status {
            RangeStatus::Ready | RangeStatus::Error => Ok(()),
            RangeStatus::Building | RangeStatus::Destroying => Err(CoreError::Conflict(format!(
                "Range '{}' is {} and cannot be destroyed until its current job finishes",
                self.name, self.status
            ))),
        }
    }
}
