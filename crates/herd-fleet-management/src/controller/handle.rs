//! FleetController handle - public API for interacting with the controller.
//!
//! A lightweight handle that can be cloned and shared across tasks. All
//! methods send commands to the internal actor and await responses.

use super::commands::ControllerCommand;
use super::types::{DaemonInfo, FleetOp, FleetOutcome, Result};
use herd_common::{DaemonRole, LifecycleError};
use herd_daemon::RemoteProcess;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Fleet controller handle.
///
/// Composes per-node [`RemoteProcess`] handles into fleet-level operations.
/// Fan-out across hosts is parallel; the aggregate always contains one entry
/// per targeted host, and one host's failure never aborts the others. The
/// controller itself never retries — retry policy belongs to the executor
/// mechanism.
#[derive(Clone)]
pub struct FleetController {
    pub(super) cmd_tx: mpsc::Sender<ControllerCommand>,
}

impl FleetController {
    // -------------------------------------------------------------------------
    // Error Mapping Helpers
    // -------------------------------------------------------------------------

    /// Map a channel send error to a LifecycleError.
    fn map_send_err(context: &str) -> LifecycleError {
        LifecycleError::controller_unavailable(format!(
            "{}: actor unavailable (channel closed)",
            context
        ))
    }

    /// Map a oneshot receive error to a LifecycleError.
    fn map_recv_err(context: &str) -> LifecycleError {
        LifecycleError::controller_unavailable(format!(
            "{}: actor dropped response (internal error)",
            context
        ))
    }

    async fn run_fleet_op(&self, op: FleetOp) -> Result<FleetOutcome> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::RunFleetOp { op, resp: tx })
            .await
            .map_err(|_| Self::map_send_err(op.name()))?;
        rx.await.map_err(|_| Self::map_recv_err(op.name()))?
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a handle under a role.
    ///
    /// Registration happens before fan-out begins: the fleet is
    /// single-writer, and adding while a fleet operation is in flight is
    /// rejected.
    ///
    /// # Errors
    /// - `LifecycleError::DuplicateHost` if the host identity already exists
    /// - `LifecycleError::OperationNotAllowed` during an in-flight operation
    /// - `LifecycleError::ControllerUnavailable` if the actor is gone
    pub async fn add_handle(
        &self,
        role: DaemonRole,
        handle: Arc<dyn RemoteProcess>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::AddHandle {
                role,
                handle,
                resp: tx,
            })
            .await
            .map_err(|_| Self::map_send_err("add_handle"))?;
        rx.await.map_err(|_| Self::map_recv_err("add_handle"))?
    }

    // -------------------------------------------------------------------------
    // Fleet Operations
    // -------------------------------------------------------------------------

    /// Start every daemon in the fleet, concurrently, waiting for all to
    /// settle.
    ///
    /// An empty fleet settles trivially with an empty aggregate.
    pub async fn start_all(&self) -> Result<FleetOutcome> {
        self.run_fleet_op(FleetOp::StartAll).await
    }

    /// Kill every daemon in the fleet, concurrently, waiting for all to
    /// settle.
    pub async fn stop_all(&self) -> Result<FleetOutcome> {
        self.run_fleet_op(FleetOp::StopAll).await
    }

    /// Start only the daemons with the given role.
    ///
    /// # Errors
    /// - `LifecycleError::NoSuchRole` if the fleet has zero handles of the
    ///   role; no remote I/O is performed
    pub async fn start_role(&self, role: DaemonRole) -> Result<FleetOutcome> {
        self.run_fleet_op(FleetOp::StartRole(role)).await
    }

    /// Kill only the daemons with the given role.
    ///
    /// # Errors
    /// - `LifecycleError::NoSuchRole` if the fleet has zero handles of the
    ///   role; no remote I/O is performed
    pub async fn stop_role(&self, role: DaemonRole) -> Result<FleetOutcome> {
        self.run_fleet_op(FleetOp::StopRole(role)).await
    }

    // -------------------------------------------------------------------------
    // Query Methods
    // -------------------------------------------------------------------------

    /// Snapshot the fleet: host, role, and cached daemon state.
    ///
    /// Served from the actor's cached view, including while a fleet
    /// operation is in flight.
    pub async fn fleet_info(&self) -> Result<Vec<DaemonInfo>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::GetFleetInfo { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("fleet_info"))?;
        rx.await.map_err(|_| Self::map_recv_err("fleet_info"))?
    }
}
