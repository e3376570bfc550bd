//! FleetControllerActor - internal actor that owns the fleet.
//!
//! Runs in a single task and processes commands from the handle. The actor
//! owns the fleet collection and the in-flight batch; neither is reachable
//! from outside the controller module.

use super::commands::ControllerCommand;
use super::fanout::{spawn_batch, HostCompleted};
use super::types::{
    ControllerOptions, DaemonInfo, FleetMember, FleetOp, FleetOutcome, HostOutcome, PendingBatch,
    Result,
};
use herd_common::{DaemonRole, LifecycleError};
use herd_daemon::RemoteProcess;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Batch ID generator
static BATCH_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_batch_id() -> u64 {
    BATCH_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Internal actor struct that owns the fleet controller state.
pub(super) struct FleetControllerActor {
    options: ControllerOptions,
    /// Ordered fleet; key is `handle.host_name()`. Single-writer: only
    /// `AddHandle` mutates it, and never while a batch is pending.
    fleet: Vec<FleetMember>,
    /// At most one fleet operation in flight.
    current_batch: Option<PendingBatch>,
    completed_tx: mpsc::Sender<HostCompleted>,
}

impl FleetControllerActor {
    pub(super) fn new(options: ControllerOptions, completed_tx: mpsc::Sender<HostCompleted>) -> Self {
        Self {
            options,
            fleet: Vec::new(),
            current_batch: None,
            completed_tx,
        }
    }

    /// Main event loop for the actor.
    ///
    /// Listens to:
    /// - External commands (handle -> actor)
    /// - Per-host completions (fan-out tasks -> actor)
    /// - The batch deadline, when one is armed
    ///
    /// ## Termination
    ///
    /// The actor exits when the command channel is closed (all controller
    /// handles dropped) AND no batch is pending. Completions are still
    /// processed after command-channel closure so an in-flight batch drains
    /// instead of leaking its fan-out tasks' reports.
    pub(super) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ControllerCommand>,
        mut completed_rx: mpsc::Receiver<HostCompleted>,
    ) {
        let mut cmd_closed = false;

        loop {
            if cmd_closed && self.current_batch.is_none() {
                info!("command channel closed and no batch pending; fleet actor exiting");
                break;
            }

            let deadline = self.current_batch.as_ref().and_then(|b| b.deadline);

            // Completions first: they settle batches and resolve oneshots.
            tokio::select! {
                biased;

                maybe_completed = completed_rx.recv() => {
                    if let Some(completed) = maybe_completed {
                        self.handle_host_completed(completed);
                    }
                    // None is unreachable while the actor holds a sender
                }

                maybe_cmd = cmd_rx.recv(), if !cmd_closed => {
                    match maybe_cmd {
                        None => {
                            debug!("command channel closed; entering drain mode");
                            cmd_closed = true;
                        }
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                _ = conditional_sleep(deadline), if deadline.is_some() => {
                    self.expire_batch();
                }
            }
        }
    }

    /// Handle a single command (non-blocking).
    fn handle_command(&mut self, cmd: ControllerCommand) {
        use ControllerCommand::*;

        match cmd {
            AddHandle { role, handle, resp } => {
                let _ = resp.send(self.handle_add(role, handle));
            }
            RunFleetOp { op, resp } => {
                self.handle_fleet_op(op, resp);
            }
            GetFleetInfo { resp } => {
                let info: Vec<DaemonInfo> = self
                    .fleet
                    .iter()
                    .map(|m| DaemonInfo {
                        host: m.handle.host_name().to_string(),
                        role: m.role,
                        state: m.handle.state(),
                    })
                    .collect();
                let _ = resp.send(Ok(info));
            }
        }
    }

    /// Register a handle under a role.
    ///
    /// The fleet is single-writer, read-many during fan-out: registration
    /// while a batch is pending is rejected outright.
    fn handle_add(&mut self, role: DaemonRole, handle: Arc<dyn RemoteProcess>) -> Result<()> {
        if self.current_batch.is_some() {
            return Err(LifecycleError::operation_not_allowed(
                "add_handle",
                "fleet operation in flight",
            ));
        }

        let host = handle.host_name().to_string();
        if self.fleet.iter().any(|m| m.handle.host_name() == host) {
            return Err(LifecycleError::duplicate_host(host));
        }

        info!(host = %host, role = %role, "registered fleet member");
        self.fleet.push(FleetMember { role, handle });
        Ok(())
    }

    /// Start a fleet operation: resolve targets, spawn the fan-out, track
    /// the batch until every host settles or the deadline fires.
    fn handle_fleet_op(&mut self, op: FleetOp, resp: oneshot::Sender<Result<FleetOutcome>>) {
        if let Some(ref batch) = self.current_batch {
            let _ = resp.send(Err(LifecycleError::operation_not_allowed(
                op.name(),
                format!("{} already in flight", batch.op.name()),
            )));
            return;
        }

        let targets: Vec<(String, DaemonRole, Arc<dyn RemoteProcess>)> = self
            .fleet
            .iter()
            .filter(|m| op.role_filter().map_or(true, |role| m.role == role))
            .map(|m| (m.handle.host_name().to_string(), m.role, Arc::clone(&m.handle)))
            .collect();

        // Role restriction over an empty selection is a caller error and
        // performs no remote I/O.
        if targets.is_empty() {
            if let Some(role) = op.role_filter() {
                let _ = resp.send(Err(LifecycleError::no_such_role(role)));
            } else {
                // Empty fleet: trivially complete
                let _ = resp.send(Ok(FleetOutcome {
                    op,
                    outcomes: Vec::new(),
                }));
            }
            return;
        }

        let batch_id = next_batch_id();
        let deadline = self
            .options
            .operation_deadline
            .map(|d| Instant::now() + d);

        info!(
            batch_id,
            op = op.name(),
            targets = targets.len(),
            "fleet operation dispatched"
        );

        self.current_batch = Some(PendingBatch {
            id: batch_id,
            op,
            targets: targets
                .iter()
                .map(|(host, role, _)| (host.clone(), *role))
                .collect(),
            outcomes: Vec::new(),
            resp,
            deadline,
        });

        spawn_batch(
            batch_id,
            op,
            targets,
            self.options.max_concurrency,
            self.completed_tx.clone(),
        );
    }

    /// Record one host's completion; settle the batch when all are in.
    fn handle_host_completed(&mut self, completed: HostCompleted) {
        let batch = match self.current_batch {
            Some(ref mut batch) if batch.id == completed.batch_id => batch,
            // Late report from an expired batch; the handle already updated
            // its own state, the aggregate was already delivered.
            _ => {
                debug!(
                    batch_id = completed.batch_id,
                    host = %completed.host,
                    "dropping completion for closed batch"
                );
                return;
            }
        };

        match completed.result {
            Ok(()) => debug!(host = %completed.host, "host settled: ok"),
            Err(ref e) => warn!(host = %completed.host, "host settled: {}", e),
        }

        batch.outcomes.push(HostOutcome {
            host: completed.host,
            role: completed.role,
            result: completed.result,
        });

        if batch.is_settled() {
            self.finish_batch();
        }
    }

    /// Deliver the aggregate for a fully settled batch.
    fn finish_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            let outcome = FleetOutcome {
                op: batch.op,
                outcomes: batch.outcomes,
            };
            info!(
                batch_id = batch.id,
                op = batch.op.name(),
                hosts = outcome.len(),
                all_succeeded = outcome.all_succeeded(),
                "fleet operation settled"
            );
            let _ = batch.resp.send(Ok(outcome));
        }
    }

    /// The deadline fired: settled hosts keep their real outcome, unsettled
    /// hosts are reported as timeouts. No partial progress is dropped.
    fn expire_batch(&mut self) {
        if let Some(mut batch) = self.current_batch.take() {
            let unsettled = batch.unsettled();
            warn!(
                batch_id = batch.id,
                op = batch.op.name(),
                unsettled = unsettled.len(),
                "fleet operation deadline expired"
            );

            for (host, role) in unsettled {
                let operation = batch.op.name();
                batch.outcomes.push(HostOutcome {
                    host: host.clone(),
                    role,
                    result: Err(LifecycleError::timeout(host, operation)),
                });
            }

            let outcome = FleetOutcome {
                op: batch.op,
                outcomes: batch.outcomes,
            };
            let _ = batch.resp.send(Ok(outcome));
        }
    }
}

/// Sleep until `deadline`; pends forever when there is none. Guarded by the
/// caller's `if deadline.is_some()`, so the forever branch is never polled.
async fn conditional_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
