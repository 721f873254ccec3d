use std::path::PathBuf;

use rangeforge_core::config::{env_optional, env_required, ConfigError};

/// How to launch the external provisioning tool.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Program to run (`PROVISIONER_COMMAND`).
    pub command: String,
    /// Arguments placed before the action (`PROVISIONER_ARGS`, whitespace separated).
    pub args: Vec<String>,
    /// Working directory for the child (`PROVISIONER_WORKDIR`).
    pub working_dir: Option<PathBuf>,
}

impl ProvisionerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let command = env_required("PROVISIONER_COMMAND")?;
        let args = env_optional("PROVISIONER_ARGS")
            .map(|raw| raw.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        let working_dir = env_optional("PROVISIONER_WORKDIR").map(PathBuf::from);

        Ok(Self {
            command,
            args,
            working_dir,
        })
    }
}
