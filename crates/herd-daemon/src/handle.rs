//! RemoteDaemonHandle - state machine plus remote mechanism for one daemon.

use crate::remote_process::{HandleOptions, RemoteProcess};
use async_trait::async_trait;
use herd_common::{DaemonRole, DaemonSpec, HostId, LifecycleError, LifecycleResult};
use herd_daemon_state::{DaemonState, DaemonStateMachine};
use herd_remote_exec::RemoteExecutor;
use std::sync::{Arc, PoisonError};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Handle for one remote daemon.
///
/// Owns the daemon's state machine and delegates all remote I/O to a
/// [`RemoteExecutor`]. Two locks with distinct jobs:
///
/// - `op_lock` serializes `start`/`kill` for this handle; it is held across
///   all remote I/O of one operation, so a second call never overlaps an
///   in-flight one and observes its completed state.
/// - `state` is a cheap sync snapshot readable while an operation is in
///   flight (fleet queries must not block on remote I/O).
pub struct RemoteDaemonHandle {
    host: HostId,
    role: DaemonRole,
    spec: DaemonSpec,
    options: HandleOptions,
    executor: Arc<dyn RemoteExecutor>,
    op_lock: tokio::sync::Mutex<()>,
    state: std::sync::Mutex<DaemonStateMachine>,
}

impl RemoteDaemonHandle {
    pub fn new(
        host: HostId,
        role: DaemonRole,
        spec: DaemonSpec,
        options: HandleOptions,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        let state = std::sync::Mutex::new(DaemonStateMachine::new(host.name()));
        Self {
            host,
            role,
            spec,
            options,
            executor,
            op_lock: tokio::sync::Mutex::new(()),
            state,
        }
    }

    /// The host identity this handle operates on.
    pub fn host(&self) -> &HostId {
        &self.host
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut DaemonStateMachine) -> T) -> T {
        let mut sm = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut sm)
    }

    fn current_state(&self) -> DaemonState {
        self.with_state(|sm| sm.current_state())
    }

    /// Poll the mechanism until the daemon's observed liveness equals
    /// `want_alive`. Runs under the caller's deadline.
    async fn await_liveness(&self, want_alive: bool) -> LifecycleResult<()> {
        loop {
            match self.executor.is_daemon_alive(&self.host, &self.spec).await {
                Ok(alive) if alive == want_alive => return Ok(()),
                Ok(_) => sleep(self.options.poll_interval).await,
                Err(e) => {
                    return Err(if want_alive {
                        LifecycleError::from_exec_on_start(self.host.name(), &e)
                    } else {
                        LifecycleError::from_exec_on_kill(self.host.name(), &e)
                    })
                }
            }
        }
    }

    fn fail_with(&self, err: LifecycleError) -> LifecycleError {
        self.with_state(|sm| {
            if sm.mark_failed(err.to_string()).is_err() {
                sm.force_failed(&err.to_string());
            }
        });
        err
    }
}

#[async_trait]
impl RemoteProcess for RemoteDaemonHandle {
    fn host_name(&self) -> &str {
        self.host.name()
    }

    fn role(&self) -> DaemonRole {
        self.role
    }

    fn state(&self) -> DaemonState {
        self.current_state()
    }

    async fn start(&self) -> LifecycleResult<()> {
        let _op = self.op_lock.lock().await;

        // Observe before trusting the cache. A cached Running/Starting may
        // be stale (remote crash); a cached NotStarted may hide a daemon
        // launched before this handle existed.
        if matches!(
            self.current_state(),
            DaemonState::Running | DaemonState::Starting
        ) {
            match self.executor.is_daemon_alive(&self.host, &self.spec).await {
                Ok(true) => {
                    debug!(host = %self.host, "start: daemon already confirmed alive");
                    self.with_state(|sm| {
                        if sm.current_state() != DaemonState::Running {
                            sm.force_running("alive at start");
                        }
                    });
                    return Ok(());
                }
                Ok(false) => {
                    warn!(host = %self.host, "start: cached state was stale, daemon is down");
                    self.with_state(|sm| sm.force_stopped("dead at start"));
                }
                Err(e) => {
                    let err = LifecycleError::from_exec_on_start(self.host.name(), &e);
                    return Err(self.fail_with(err));
                }
            }
        }

        self.with_state(|sm| sm.mark_starting())?;
        debug!(host = %self.host, role = %self.role, "starting daemon");

        if !self.executor.is_reachable(&self.host).await {
            let err = LifecycleError::connect_failure(self.host.name(), "host unreachable");
            return Err(self.fail_with(err));
        }

        // The daemon may already be up even with a cold cache (supervisor
        // restart). Confirmed alive is confirmed alive.
        match self.executor.is_daemon_alive(&self.host, &self.spec).await {
            Ok(true) => {
                info!(host = %self.host, "daemon already running, start is a no-op");
                self.with_state(|sm| sm.mark_running())?;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                let err = LifecycleError::from_exec_on_start(self.host.name(), &e);
                return Err(self.fail_with(err));
            }
        }

        if let Err(e) = self.executor.launch(&self.host, &self.spec).await {
            let err = LifecycleError::from_exec_on_start(self.host.name(), &e);
            return Err(self.fail_with(err));
        }

        // Launch only means the command ran; success means confirmed alive.
        match timeout(self.options.start_timeout, self.await_liveness(true)).await {
            Ok(Ok(())) => {
                self.with_state(|sm| sm.mark_running())?;
                info!(host = %self.host, role = %self.role, "daemon started and confirmed alive");
                Ok(())
            }
            Ok(Err(err)) => Err(self.fail_with(err)),
            Err(_) => {
                let err = LifecycleError::timeout(self.host.name(), "start");
                Err(self.fail_with(err))
            }
        }
    }

    async fn kill(&self) -> LifecycleResult<()> {
        let _op = self.op_lock.lock().await;

        // Idempotent stop: a kill on an already-dead daemon is a success,
        // but the verdict comes from the remote host, not the cache.
        if matches!(
            self.current_state(),
            DaemonState::NotStarted | DaemonState::Stopped
        ) {
            match self.executor.is_daemon_alive(&self.host, &self.spec).await {
                Ok(false) => {
                    debug!(host = %self.host, "kill: daemon already dead");
                    self.with_state(|sm| {
                        if sm.current_state() != DaemonState::Stopped {
                            sm.force_stopped("dead at kill");
                        }
                    });
                    return Ok(());
                }
                Ok(true) => {
                    warn!(host = %self.host, "kill: cached state was stale, daemon is alive");
                    self.with_state(|sm| sm.force_running("alive at kill"));
                }
                Err(e) => {
                    let err = LifecycleError::from_exec_on_kill(self.host.name(), &e);
                    return Err(self.fail_with(err));
                }
            }
        }

        self.with_state(|sm| sm.mark_stopping())?;
        debug!(host = %self.host, role = %self.role, "stopping daemon");

        if let Err(e) = self.executor.terminate(&self.host, &self.spec).await {
            let err = LifecycleError::from_exec_on_kill(self.host.name(), &e);
            return Err(self.fail_with(err));
        }

        // Unconfirmed termination stays Failed, never a false Stopped.
        match timeout(self.options.stop_timeout, self.await_liveness(false)).await {
            Ok(Ok(())) => {
                self.with_state(|sm| sm.mark_stopped())?;
                info!(host = %self.host, role = %self.role, "daemon stopped and confirmed dead");
                Ok(())
            }
            Ok(Err(err)) => Err(self.fail_with(err)),
            Err(_) => {
                let err = LifecycleError::timeout(self.host.name(), "kill");
                Err(self.fail_with(err))
            }
        }
    }
}
