//! Parallel fan-out of one fleet operation across its target hosts.
//!
//! One task per target, bounded by a semaphore. Panics inside a per-host
//! task are caught and converted into that host's failure outcome, so the
//! batch always settles host by host.

use super::types::{FleetOp, Result};
use futures::FutureExt;
use herd_common::{DaemonRole, LifecycleError};
use herd_daemon::RemoteProcess;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

/// Result of one host's operation (fan-out task -> actor).
pub(super) struct HostCompleted {
    pub batch_id: u64,
    pub host: String,
    pub role: DaemonRole,
    pub result: Result<()>,
}

/// Spawn one task per target host for `op`.
///
/// Each task acquires a semaphore permit, runs the per-host call with panic
/// recovery, and reports a `HostCompleted` back to the actor. Cross-host
/// ordering is unspecified; per-host ordering is the handle's own op-lock.
pub(super) fn spawn_batch(
    batch_id: u64,
    op: FleetOp,
    targets: Vec<(String, DaemonRole, Arc<dyn RemoteProcess>)>,
    max_concurrency: usize,
    completed_tx: mpsc::Sender<HostCompleted>,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    for (host, role, handle) in targets {
        let semaphore = Arc::clone(&semaphore);
        let completed_tx = completed_tx.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed: report rather than vanish, so the
                    // batch counter still settles.
                    let _ = completed_tx
                        .send(HostCompleted {
                            batch_id,
                            host: host.clone(),
                            role,
                            result: Err(LifecycleError::operation_not_allowed(
                                op.name(),
                                "fan-out semaphore closed",
                            )),
                        })
                        .await;
                    return;
                }
            };

            debug!(host = %host, op = op.name(), "fan-out task running");

            let call = async {
                if op.is_start() {
                    handle.start().await
                } else {
                    handle.kill().await
                }
            };

            let result = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => result,
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!(host = %host, op = op.name(), "per-host task panicked: {}", panic_msg);

                    let reason = format!("task panicked: {}", panic_msg);
                    Err(if op.is_start() {
                        LifecycleError::launch_failure(host.clone(), reason)
                    } else {
                        LifecycleError::terminate_failure(host.clone(), reason)
                    })
                }
            };

            if completed_tx
                .send(HostCompleted {
                    batch_id,
                    host,
                    role,
                    result,
                })
                .await
                .is_err()
            {
                error!("failed to report host completion: completion channel closed");
            }
        });
    }
}
