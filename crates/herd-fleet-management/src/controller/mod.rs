//! Fleet controller - actor-based orchestration over RemoteProcess handles.
//!
//! This module focuses on fleet-level orchestration with an actor-style
//! design:
//! - A single event loop owns the fleet and the in-flight batch
//! - A command enum represents messages to the actor
//! - A handle struct provides the public API by sending commands over a
//!   channel
//!
//! ## Batch Semantics
//!
//! One fleet operation runs at a time. Per-host calls fan out in parallel
//! (bounded by `max_concurrency`), and the aggregate is delivered only when
//! every targeted host has settled or the operation deadline fires. Hosts
//! past the deadline are reported as timeouts; hosts that already settled
//! keep their real outcome — partial progress is never dropped.
//!
//! A second fleet operation, or a registration, issued while a batch is
//! pending returns `OperationNotAllowed`. Queries are always served from the
//! cached view.
//!
//! ## Actor Lifecycle
//!
//! The actor exits when all `FleetController` handles are dropped (channel
//! closed) and any pending batch has drained. Per-host tasks that report
//! after a batch closed are discarded; the handles have already recorded
//! their own state.

// Internal modules (not exposed)
mod actor;
mod commands;
mod fanout;
mod handle;

// Types module (mixed visibility)
mod types;

#[cfg(test)]
mod tests;

// Re-export public types only
pub use handle::FleetController;
pub use types::{ControllerOptions, DaemonInfo, FleetOp, FleetOutcome, HostOutcome};

use actor::FleetControllerActor;
use commands::ControllerCommand;
use fanout::HostCompleted;
use tokio::sync::mpsc;
use tracing::debug;

impl FleetController {
    /// Create a new fleet controller with the given options.
    ///
    /// Spawns the internal actor; the returned handle (and its clones) keep
    /// it alive.
    pub fn new(options: ControllerOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ControllerCommand>(32);
        let (completed_tx, completed_rx) = mpsc::channel::<HostCompleted>(256);

        let actor = FleetControllerActor::new(options, completed_tx);
        tokio::spawn(actor.run(cmd_rx, completed_rx));

        debug!("fleet controller actor spawned");
        FleetController { cmd_tx }
    }
}

impl Default for FleetController {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}
