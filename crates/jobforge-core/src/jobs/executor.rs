//! Shell command executor

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::jobs::{ExecError, Executor};

/// Executes job commands through a shell.
///
/// The child process is killed outright when the cancellation token fires;
/// a shell command cannot be relied on to poll the token itself.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    /// Create an executor using `sh`
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Create an executor using a specific shell binary
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<String, ExecError> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Failed(format!("failed to spawn command: {}", e)))?;

        // Drain pipes concurrently so a chatty child cannot block on a full
        // pipe buffer before exiting.
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_string(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(err) = stderr.as_mut() {
                let _ = err.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(ExecError::Cancelled);
            }
            status = child.wait() => {
                status.map_err(|e| ExecError::Failed(format!("failed to wait for command: {}", e)))?
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(stdout.trim_end().to_string())
        } else {
            let detail = stderr.trim();
            if detail.is_empty() {
                Err(ExecError::Failed(format!("command exited with {}", status)))
            } else {
                Err(ExecError::Failed(format!(
                    "command exited with {}: {}",
                    status, detail
                )))
            }
        }
    }
}
