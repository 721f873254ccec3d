//! Blueprint templates: the VPC → Subnet → Host tree a range is built from.
//!
//! Tag fields (`os`, `size`) are kept as strings so that an unknown tag is
//! reported by the validator alongside every other violation instead of
//! failing deserialization of the whole document.

use serde::{Deserialize, Serialize};

use crate::tags::Provider;
use crate::types::{new_id, BlueprintId, Owner, Timestamp};

/// Optional capabilities provisioned alongside the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintFeatures {
    /// Remote desktop access to hosts.
    #[serde(default)]
    pub vnc: bool,
    /// VPN gateway into the range.
    #[serde(default)]
    pub vpn: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTemplate {
    pub hostname: String,
    pub os: String,
    pub size: String,
    pub disk_gib: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetTemplate {
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub hosts: Vec<HostTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcTemplate {
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub subnets: Vec<SubnetTemplate>,
}

// Validation ignores surrounding whitespace, so stored values must too.

impl HostTemplate {
    fn normalized(self) -> Self {
        Self {
            hostname: self.hostname.trim().to_string(),
            ..self
        }
    }
}

impl SubnetTemplate {
    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            cidr: self.cidr.trim().to_string(),
            hosts: self.hosts.into_iter().map(HostTemplate::normalized).collect(),
        }
    }
}

impl VpcTemplate {
    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            cidr: self.cidr.trim().to_string(),
            subnets: self.subnets.into_iter().map(SubnetTemplate::normalized).collect(),
        }
    }
}

/// DTO for `POST /api/v1/blueprints`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlueprint {
    pub name: String,
    pub description: Option<String>,
    pub provider: Provider,
    #[serde(default)]
    pub features: BlueprintFeatures,
    #[serde(default)]
    pub vpcs: Vec<VpcTemplate>,
}

/// A stored blueprint. Immutable once created; there is no update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub owner: Owner,
    pub name: String,
    pub description: Option<String>,
    pub provider: Provider,
    pub features: BlueprintFeatures,
    pub vpcs: Vec<VpcTemplate>,
    pub created_at: Timestamp,
}

impl Blueprint {
    /// Build a blueprint from an already-validated create request.
    pub fn from_create(owner: &str, input: CreateBlueprint) -> Self {
        Self {
            id: new_id(),
            owner: owner.to_string(),
            name: input.name.trim().to_string(),
            description: input.description,
            provider: input.provider,
            features: input.features,
            vpcs: input.vpcs.into_iter().map(VpcTemplate::normalized).collect(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn subnet_count(&self) -> usize {
        self.vpcs.iter().map(|v| v.subnets.len()).sum()
    }

    pub fn host_count(&self) -> usize {
        self.vpcs
            .iter()
            .flat_map(|v| &v.subnets)
            .map(|s| s.hosts.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_default_to_disabled_when_omitted() {
        let input: CreateBlueprint = serde_json::from_value(serde_json::json!({
            "name": "lab",
            "description": null,
            "provider": "aws",
            "vpcs": []
        }))
        .unwrap();
        assert_eq!(input.features, BlueprintFeatures::default());
    }

    #[test]
    fn counts_walk_the_whole_tree() {
        let host = |name: &str| HostTemplate {
            hostname: name.into(),
            os: "debian_12".into(),
            size: "small".into(),
            disk_gib: 8,
            tags: vec![],
        };
        let bp = Blueprint::from_create(
            "alice",
            CreateBlueprint {
                name: "  lab  ".into(),
                description: None,
                provider: Provider::Aws,
                features: BlueprintFeatures::default(),
                vpcs: vec![VpcTemplate {
                    name: "main".into(),
                    cidr: "10.0.0.0/16".into(),
                    subnets: vec![
                        SubnetTemplate {
                            name: "a".into(),
                            cidr: "10.0.1.0/24".into(),
                            hosts: vec![host("web"), host("db")],
                        },
                        SubnetTemplate {
                            name: "b".into(),
                            cidr: "10.0.2.0/24".into(),
                            hosts: vec![host("jump")],
                        },
                    ],
                }],
            },
        );
        assert_eq!(bp.name, "lab");
        assert_eq!(bp.subnet_count(), 2);
        assert_eq!(bp.host_count(), 3);
    }

    #[test]
    fn stored_tree_is_trimmed_like_the_validator_sees_it() {
        let input = CreateBlueprint {
            name: "lab".into(),
            description: None,
            provider: Provider::Aws,
            features: BlueprintFeatures::default(),
            vpcs: vec![VpcTemplate {
                name: " corp ".into(),
                cidr: "10.0.0.0/16 ".into(),
                subnets: vec![SubnetTemplate {
                    name: "\tdmz".into(),
                    cidr: " 10.0.1.0/24".into(),
                    hosts: vec![HostTemplate {
                        hostname: " web".into(),
                        os: "ubuntu_22".into(),
                        size: "small".into(),
                        disk_gib: 20,
                        tags: vec![],
                    }],
                }],
            }],
        };
        crate::validation::validate_blueprint(&input).unwrap();

        let bp = Blueprint::from_create("alice", input);
        let vpc = &bp.vpcs[0];
        assert_eq!((vpc.name.as_str(), vpc.cidr.as_str()), ("corp", "10.0.0.0/16"));
        let subnet = &vpc.subnets[0];
        assert_eq!((subnet.name.as_str(), subnet.cidr.as_str()), ("dmz", "10.0.1.0/24"));
        assert_eq!(subnet.hosts[0].hostname, "web");
        assert_eq!(subnet.hosts[0].os, "ubuntu_22");
    }
}
