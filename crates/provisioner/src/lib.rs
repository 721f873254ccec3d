//! The provisioning collaborator: whatever actually creates and tears down
//! cloud resources for a range.
//!
//! Workers only see the [`Provisioner`] trait. [`CommandProvisioner`]
//! drives an external infrastructure tool as a subprocess.

use async_trait::async_trait;

pub mod command;
pub mod config;
pub mod error;
pub mod plan;

pub use command::CommandProvisioner;
pub use config::ProvisionerConfig;
pub use error::{ErrorClass, ProvisionError};
pub use plan::{
    DeployOutcome, DeployPlan, DestroyPlan, ProvisionedHost, ProvisionedSubnet, ProvisionedVpc,
};

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create every resource in the plan and report their identifiers.
    async fn deploy(&self, plan: &DeployPlan) -> Result<DeployOutcome, ProvisionError>;

    /// Tear down the resources recorded for a range.
    async fn destroy(&self, plan: &DestroyPlan) -> Result<(), ProvisionError>;
}
