//! Internal command protocol for the fleet controller actor.
//!
//! These message types travel between the `FleetController` handle and the
//! `FleetControllerActor`. They are NOT exposed outside the controller
//! module.

use super::types::{DaemonInfo, FleetOp, FleetOutcome, Result};
use herd_common::DaemonRole;
use herd_daemon::RemoteProcess;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Command messages for the fleet controller actor.
pub(super) enum ControllerCommand {
    /// Register a handle under a role
    AddHandle {
        role: DaemonRole,
        handle: Arc<dyn RemoteProcess>,
        resp: oneshot::Sender<Result<()>>,
    },
    /// Run a fleet operation (start/stop, all or by role)
    RunFleetOp {
        op: FleetOp,
        resp: oneshot::Sender<Result<FleetOutcome>>,
    },
    /// Snapshot the fleet (host, role, cached state); served during fan-out
    GetFleetInfo {
        resp: oneshot::Sender<Result<Vec<DaemonInfo>>>,
    },
}
