//! Bounded-retry decorator for remote executors.
//!
//! Wraps any [`RemoteExecutor`] and repeats `launch`/`terminate` on
//! delivery failures with exponential backoff. Only connect failures are
//! retried: the command never ran, so repeating it is safe regardless of
//! what it does. A command that ran and failed is never repeated here.
//!
//! Observation calls (`is_reachable`, `is_daemon_alive`) pass through
//! unretried; callers poll those on their own cadence.

use crate::RemoteExecutor;
use async_trait::async_trait;
use herd_common::{DaemonSpec, ExecError, ExecResult, HostId};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for delivery failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included. 1 means no retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_rate: f32,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_rate: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), with exponential
    /// backoff capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_rate.powi(retry as i32);
        let delay = self.initial_delay.as_secs_f64() * multiplier as f64;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Which delivery operation is being retried.
#[derive(Debug, Clone, Copy)]
enum DeliveryOp {
    Launch,
    Terminate,
}

impl DeliveryOp {
    fn name(&self) -> &'static str {
        match self {
            DeliveryOp::Launch => "launch",
            DeliveryOp::Terminate => "terminate",
        }
    }
}

/// Executor decorator that retries delivery failures.
pub struct RetryingExecutor<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: RemoteExecutor> RetryingExecutor<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn deliver(&self, op: DeliveryOp, host: &HostId, spec: &DaemonSpec) -> ExecResult<()> {
        let mut last_err = None;

        for attempt in 0..self.policy.max_attempts.max(1) {
            if attempt > 0 {
                let delay = self.policy.delay_for_retry(attempt - 1);
                debug!(host = %host, op = op.name(), attempt, ?delay, "retrying after delivery failure");
                sleep(delay).await;
            }

            let result = match op {
                DeliveryOp::Launch => self.inner.launch(host, spec).await,
                DeliveryOp::Terminate => self.inner.terminate(host, spec).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_connect_failure() => {
                    warn!(host = %host, op = op.name(), attempt, "delivery failed: {}", e);
                    last_err = Some(e);
                }
                // The command reached the host; not safe to repeat
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| ExecError::connect_failure(host.name(), "no attempts made")))
    }
}

#[async_trait]
impl<E: RemoteExecutor> RemoteExecutor for RetryingExecutor<E> {
    async fn launch(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<()> {
        self.deliver(DeliveryOp::Launch, host, spec).await
    }

    async fn terminate(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<()> {
        self.deliver(DeliveryOp::Terminate, host, spec).await
    }

    async fn is_reachable(&self, host: &HostId) -> bool {
        self.inner.is_reachable(host).await
    }

    async fn is_daemon_alive(&self, host: &HostId, spec: &DaemonSpec) -> ExecResult<bool> {
        self.inner.is_daemon_alive(host, spec).await
    }
}
