//! Shell-over-ssh executor.
//!
//! Runs daemon commands on remote hosts by invoking the local `ssh` binary
//! in batch mode. ssh reserves exit status 255 for its own failures, which
//! is how delivery errors are told apart from remote command failures.

use crate::RemoteExecutor;
use async_trait::async_trait;
use herd_common::{DaemonSpec, ExecError, ExecResult, HostId};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// ssh's reserved exit status for connection/authentication failures.
const SSH_EXIT_CONNECT_FAILURE: i32 = 255;

/// Options for the ssh mechanism.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// ssh binary to invoke.
    pub binary: String,
    /// Connection timeout passed to ssh (`-o ConnectTimeout`).
    pub connect_timeout: Duration,
    /// Overall deadline for one remote command, connection included.
    pub command_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Shell-over-secure-channel executor.
pub struct SshExecutor {
    options: SshOptions,
}

impl SshExecutor {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Build the argument vector for one remote command invocation.
    ///
    /// BatchMode keeps ssh from blocking on interactive prompts; a hung
    /// prompt would otherwise eat the whole command deadline.
    fn build_args(&self, host: &HostId, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
            "-p".to_string(),
            host.port().to_string(),
        ];

        if let Some(credential_ref) = host.credential_ref() {
            args.push("-i".to_string());
            args.push(credential_ref.to_string());
        }

        let target = match host.user() {
            Some(user) => format!("{}@{}", user, host.name()),
            None => host.name().to_string(),
        };
        args.push(target);
        args.push(command.to_string());

        args
    }

    /// Run one command on the host and classify the outcome.
    async fn run_remote(&self, host: &HostId, command: &str) -> ExecResult<Output> {
        let args = self.build_args(host, command);
        debug!(host = %host, command, "running remote command");

        let output = timeout(
            self.options.command_timeout,
            Command::new(&self.options.binary).args(&args).output(),
        )
        .await
        .map_err(|_| ExecError::timeout(host.name()))?
        .map_err(|e| ExecError::io(host.name(), e))?;

        match output.status.code() {
            Some(0) => Ok(output),
            Some(SSH_EXIT_CONNECT_FAILURE) => Err(ExecError::connect_failure(
                host.name(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
            Some(code) => Err(ExecError::command_failed(
                host.name(),
                command,
                code,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
            // Killed by signal
            None => Err(ExecError::command_failed(
                host.name(),
                command,
                -1,
                "terminated by signal".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn launch(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<()> {
        self.run_remote(host, &spec.start_command).await.map(|_| ())
    }

    async fn terminate(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<()> {
        self.run_remote(host, &spec.stop_command).await.map(|_| ())
    }

    async fn is_reachable(&self, host: &HostId) -> bool {
        self.run_remote(host, "true").await.is_ok()
    }

    async fn is_daemon_alive(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<bool> {
        match self.run_remote(host, &spec.liveness_command).await {
            Ok(_) => Ok(true),
            // The question was asked and answered: daemon not there
            Err(ExecError::CommandFailed { .. }) => Ok(false),
            // The question could not be asked
            Err(e) => Err(e),
        }
    }
}
