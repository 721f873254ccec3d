//! Subprocess-backed provisioner.
//!
//! The configured program is run as `<command> <args...> deploy|destroy`
//! with the plan as JSON on stdin. It must print one JSON document on
//! stdout:
//!
//! ```text
//! {"ok": true, ...payload}
//! {"ok": false, "error": "...", "transient": true|false}
//! ```
//!
//! Without a parsable document, a non-zero exit is terminal unless stderr
//! carries a throttling marker. Dropping an in-flight call (for example on
//! a caller-side timeout) kills the child.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::ProvisionerConfig;
use crate::error::{is_throttled, ProvisionError};
use crate::plan::{DeployOutcome, DeployPlan, DestroyPlan};
use crate::Provisioner;

/// Per-stream capture limit (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How much of stderr is quoted in an error message.
const STDERR_EXCERPT_CHARS: usize = 500;

pub struct CommandProvisioner {
    config: ProvisionerConfig,
}

impl CommandProvisioner {
    pub fn new(config: ProvisionerConfig) -> Self {
        Self { config }
    }

    async fn invoke<T: Serialize + Sync>(
        &self,
        action: &str,
        request: &T,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ProvisionError> {
        let payload = serde_json::to_vec(request).map_err(ProvisionError::protocol)?;

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args).arg(action);

        let output = run_command(&mut cmd, &payload, self.config.working_dir.as_deref())
            .await
            .map_err(|e| ProvisionError::io(&e))?;

        tracing::debug!(
            action,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "Provisioner exited"
        );

        interpret(&output)
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn deploy(&self, plan: &DeployPlan) -> Result<DeployOutcome, ProvisionError> {
        let payload = self.invoke("deploy", plan).await?;
        serde_json::from_value(serde_json::Value::Object(payload))
            .map_err(ProvisionError::protocol)
    }

    async fn destroy(&self, plan: &DestroyPlan) -> Result<(), ProvisionError> {
        self.invoke("destroy", plan).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reply protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    transient: bool,
    #[serde(flatten)]
    payload: serde_json::Map<String, serde_json::Value>,
}

/// Find the reply document: the whole of stdout, or failing that its last
/// non-empty line (tools tend to log before answering).
fn parse_reply(stdout: &str) -> Option<Reply> {
    let trimmed = stdout.trim();
    if let Ok(reply) = serde_json::from_str(trimmed) {
        return Some(reply);
    }
    let last = trimmed.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(last.trim()).ok()
}

fn stderr_excerpt(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    match trimmed.char_indices().rev().nth(STDERR_EXCERPT_CHARS) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

fn interpret(
    output: &CommandOutput,
) -> Result<serde_json::Map<String, serde_json::Value>, ProvisionError> {
    match parse_reply(&output.stdout) {
        Some(reply) if reply.ok => Ok(reply.payload),
        Some(reply) => {
            let message = reply
                .error
                .unwrap_or_else(|| "provisioner reported failure".to_string());
            if reply.transient || is_throttled(&output.stderr) {
                Err(ProvisionError::transient(message))
            } else {
                Err(ProvisionError::terminal(message))
            }
        }
        None if output.exit_code == 0 => Err(ProvisionError::protocol(
            "no result document on stdout",
        )),
        None => {
            let message = format!(
                "provisioner exited with code {}: {}",
                output.exit_code,
                stderr_excerpt(&output.stderr)
            );
            if is_throttled(&output.stderr) {
                Err(ProvisionError::transient(message))
            } else {
                Err(ProvisionError::terminal(message))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Process handling
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
    /// `-1` if killed by a signal.
    exit_code: i32,
    duration_ms: u64,
}

/// Spawn `cmd`, feed `stdin`, and collect both output streams.
async fn run_command(
    cmd: &mut Command,
    stdin: &[u8],
    working_dir: Option<&Path>,
) -> std::io::Result<CommandOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let Some(mut pipe) = child.stdin.take() {
        // The child may exit without reading its input.
        let _ = pipe.write_all(stdin).await;
        drop(pipe);
    }

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = child.wait().await?;
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES as u64).read_to_end(&mut buf).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
