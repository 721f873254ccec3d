//! Explicit per-entity display fields.
//!
//! Each displayable entity lists its own labeled, pre-formatted fields.
//! Renderers (CLI tables, detail views) only ever see `(label, value)`
//! pairs, so adding a column is a compile-checked change here.

use crate::blueprint::Blueprint;
use crate::job::{Job, JobLookup};
use crate::range::{DeployedHost, Range};
use crate::types::Timestamp;

/// Placeholder for absent values.
pub const EMPTY: &str = "-";

pub trait Fields {
    /// Labeled values, in display order.
    fn fields(&self) -> Vec<(&'static str, String)>;
}

fn timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn opt_timestamp(ts: Option<&Timestamp>) -> String {
    ts.map(timestamp).unwrap_or_else(|| EMPTY.to_string())
}

fn opt_text(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => EMPTY.to_string(),
    }
}

impl Fields for Blueprint {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("Provider", self.provider.to_string()),
            ("VPCs", self.vpcs.len().to_string()),
            ("Subnets", self.subnet_count().to_string()),
            ("Hosts", self.host_count().to_string()),
            ("VNC", self.features.vnc.to_string()),
            ("VPN", self.features.vpn.to_string()),
            ("Description", opt_text(self.description.as_deref())),
            ("Created", timestamp(&self.created_at)),
        ]
    }
}

impl Fields for Range {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("Status", self.status.to_string()),
            ("Provider", self.provider.to_string()),
            ("Region", self.region.to_string()),
            ("Hosts", self.host_count().to_string()),
            ("Blueprint", self.blueprint_id.to_string()),
            ("Description", opt_text(self.description.as_deref())),
            ("Created", timestamp(&self.created_at)),
            ("Updated", timestamp(&self.updated_at)),
        ]
    }
}

impl Fields for DeployedHost {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Hostname", self.hostname.clone()),
            ("Status", self.status.to_string()),
            (
                "Address",
                self.ip_address
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| EMPTY.to_string()),
            ),
            ("OS", self.os.clone()),
            ("Size", self.size.clone()),
            ("Disk (GiB)", self.disk_gib.to_string()),
            ("Resource", opt_text(Some(&self.resource_id))),
        ]
    }
}

impl Fields for Job {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let result = self
            .result
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| EMPTY.to_string());
        vec![
            ("ID", self.id.to_string()),
            ("Kind", self.kind.to_string()),
            ("Status", self.status.to_string()),
            ("Target", self.target_key.clone()),
            ("Attempt", self.attempt.to_string()),
            ("Enqueued", timestamp(&self.enqueued_at)),
            ("Started", opt_timestamp(self.started_at.as_ref())),
            ("Finished", opt_timestamp(self.finished_at.as_ref())),
            ("Result", result),
            ("Error", opt_text(self.error.as_deref())),
        ]
    }
}

impl Fields for JobLookup {
    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            JobLookup::Found(job) => job.fields(),
            JobLookup::NotFound(missing) => vec![
                ("ID", missing.id.to_string()),
                ("Status", self.status_label().to_string()),
            ],
        }
    }
}
