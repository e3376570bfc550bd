//! RemoteProcess trait - the per-node daemon lifecycle contract.

use async_trait::async_trait;
use herd_common::{DaemonRole, LifecycleResult};
use herd_daemon_state::DaemonState;
use std::time::Duration;

/// Contract for managing one remote daemon's lifecycle.
///
/// One instance per managed daemon. Implementations own the daemon's
/// [`DaemonState`] exclusively: callers mutate it only through
/// [`start`](Self::start) and [`kill`](Self::kill).
///
/// Methods take `&self`: the controller shares handles across concurrent
/// fan-out tasks, so per-handle exclusion is the implementation's job (see
/// `RemoteDaemonHandle`), not the borrow checker's.
#[async_trait]
pub trait RemoteProcess: Send + Sync {
    /// The host identity used for all remote operations. Pure accessor.
    fn host_name(&self) -> &str;

    /// Role of the daemon in the cluster. Fixed at construction.
    fn role(&self) -> DaemonRole;

    /// Current cached lifecycle state. Cheap snapshot; may lag the remote
    /// truth between operations.
    fn state(&self) -> DaemonState;

    /// Launch the daemon and confirm it is alive.
    ///
    /// Safe to call when the true remote state is unknown: the cached state
    /// is only a best-effort starting point, and the attempt is observed
    /// against the actual remote state. On success the daemon is confirmed
    /// reachable and listening, not merely "launch command issued". On
    /// failure the state is `Failed` and the error names the cause.
    async fn start(&self) -> LifecycleResult<()>;

    /// Terminate the daemon and confirm it is gone.
    ///
    /// Idempotent: killing an already-dead daemon (including one never
    /// started through this handle) succeeds with state `Stopped`. A kill
    /// that cannot confirm termination leaves the state `Failed`, never a
    /// false `Stopped`.
    async fn kill(&self) -> LifecycleResult<()>;
}

/// Per-handle timing options.
#[derive(Debug, Clone)]
pub struct HandleOptions {
    /// Deadline for `start`, liveness confirmation included.
    pub start_timeout: Duration,
    /// Deadline for `kill`, termination confirmation included.
    pub stop_timeout: Duration,
    /// Cadence of the confirmation polling loops.
    pub poll_interval: Duration,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = HandleOptions::default();
        assert_eq!(options.start_timeout, Duration::from_secs(30));
        assert_eq!(options.stop_timeout, Duration::from_secs(30));
        assert_eq!(options.poll_interval, Duration::from_millis(250));
    }
}
