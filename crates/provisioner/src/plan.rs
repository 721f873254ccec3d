//! Documents exchanged with the provisioner.

use std::net::Ipv4Addr;

use rangeforge_core::blueprint::{BlueprintFeatures, HostTemplate, VpcTemplate};
use rangeforge_core::range::{DeployedHost, DeployedSubnet, DeployedVpc, HostStatus};
use rangeforge_core::tags::{Provider, Region};
use rangeforge_core::types::{JobId, RangeId};
use serde::{Deserialize, Serialize};

/// Everything needed to create a range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployPlan {
    pub job_id: JobId,
    pub range_id: RangeId,
    pub owner: String,
    pub name: String,
    pub provider: Provider,
    pub region: Region,
    pub features: BlueprintFeatures,
    pub vpcs: Vec<VpcTemplate>,
}

/// Everything needed to tear a range down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyPlan {
    pub job_id: JobId,
    pub range_id: RangeId,
    pub provider: Provider,
    pub region: Region,
    pub resource_ids: Vec<String>,
    /// State document returned by the deploy, if any.
    pub state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedHost {
    pub hostname: String,
    pub resource_id: String,
    #[serde(default)]
    pub ip_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub status: Option<HostStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedSubnet {
    pub name: String,
    pub resource_id: String,
    #[serde(default)]
    pub hosts: Vec<ProvisionedHost>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedVpc {
    pub name: String,
    pub resource_id: String,
    #[serde(default)]
    pub subnets: Vec<ProvisionedSubnet>,
}

/// What a successful deploy reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployOutcome {
    #[serde(default)]
    pub vpcs: Vec<ProvisionedVpc>,
    #[serde(default)]
    pub state: Option<serde_json::Value>,
}

impl DeployOutcome {
    /// Merge reported identifiers into the template tree.
    ///
    /// The template decides the shape; entries are matched by name at each
    /// level. Anything the provisioner did not report keeps an empty
    /// resource id and `unknown` host status.
    pub fn assemble(&self, templates: &[VpcTemplate]) -> Vec<DeployedVpc> {
        templates
            .iter()
            .map(|vpc| {
                let reported = self.vpcs.iter().find(|v| v.name == vpc.name);
                DeployedVpc {
                    name: vpc.name.clone(),
                    cidr: vpc.cidr.clone(),
                    resource_id: reported.map(|v| v.resource_id.clone()).unwrap_or_default(),
                    subnets: vpc
                        .subnets
                        .iter()
                        .map(|subnet| {
                            let reported = reported
                                .and_then(|v| v.subnets.iter().find(|s| s.name == subnet.name));
                            DeployedSubnet {
                                name: subnet.name.clone(),
                                cidr: subnet.cidr.clone(),
                                resource_id: reported
                                    .map(|s| s.resource_id.clone())
                                    .unwrap_or_default(),
                                hosts: subnet
                                    .hosts
                                    .iter()
                                    .map(|host| {
                                        let reported = reported.and_then(|s| {
                                            s.hosts.iter().find(|h| h.hostname == host.hostname)
                                        });
                                        deployed_host(host, reported)
                                    })
                                    .collect(),
                            }
                        })
                        .collect(),
                }
            })
            .collect()
    }
}

fn deployed_host(template: &HostTemplate, reported: Option<&ProvisionedHost>) -> DeployedHost {
    let (resource_id, ip_address, status) = match reported {
        Some(h) => (
            h.resource_id.clone(),
            h.ip_address,
            h.status.unwrap_or(HostStatus::Running),
        ),
        None => (String::new(), None, HostStatus::Unknown),
    };
    DeployedHost {
        hostname: template.hostname.clone(),
        os: template.os.clone(),
        size: template.size.clone(),
        disk_gib: template.disk_gib,
        tags: template.tags.clone(),
        resource_id,
        status,
        ip_address,
    }
}
