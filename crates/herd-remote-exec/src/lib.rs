//! # Herd Remote Exec
//!
//! Remote-execution mechanisms for the herd supervisor.
//!
//! This crate provides:
//! - The [`RemoteExecutor`] trait — the seam between daemon handles and
//!   whatever actually reaches the host (shell over a secure channel, an
//!   agent RPC, a container runtime)
//! - [`SshExecutor`] — shell-over-ssh adapter
//! - [`RetryingExecutor`] — bounded-retry decorator for delivery failures
//!
//! Retry policy lives here, not in the fleet controller: each mechanism
//! knows which of its failures are idempotent-safe to repeat.

pub mod retry;
pub mod ssh;

use async_trait::async_trait;
use herd_common::{DaemonSpec, ExecResult, HostId};

pub use retry::{RetryPolicy, RetryingExecutor};
pub use ssh::{SshExecutor, SshOptions};

/// The mechanism a daemon handle delegates remote operations to.
///
/// The handle is the sole caller. Success of [`launch`](Self::launch) means
/// the command was delivered and ran — not that the daemon is up; liveness
/// is confirmed separately through
/// [`is_daemon_alive`](Self::is_daemon_alive).
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Issue the daemon's start command on the host.
    async fn launch(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<()>;

    /// Issue the daemon's stop command on the host.
    async fn terminate(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<()>;

    /// Host-level connectivity check.
    async fn is_reachable(&self, host: &HostId) -> bool;

    /// Daemon-level observation: is the daemon currently alive on the host?
    ///
    /// Non-destructive. Errors mean the question could not be asked (host
    /// unreachable), not that the daemon is dead.
    async fn is_daemon_alive(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<bool>;
}
