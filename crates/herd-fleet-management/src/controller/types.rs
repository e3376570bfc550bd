//! Shared data types for the fleet controller module.
//!
//! This module contains:
//! - Public types exposed to external callers (FleetOp, HostOutcome,
//!   FleetOutcome, DaemonInfo, ControllerOptions)
//! - Crate-internal types used for orchestration (FleetMember, PendingBatch)

use herd_common::{DaemonRole, LifecycleError};
use herd_daemon::RemoteProcess;
use herd_daemon_state::DaemonState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

// ============================================================================
// Public Types - Exposed to external callers
// ============================================================================

/// Result type for controller operations.
pub(super) type Result<T> = std::result::Result<T, LifecycleError>;

/// Kind of fleet operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetOp {
    /// Start every handle in the fleet
    StartAll,
    /// Kill every handle in the fleet
    StopAll,
    /// Start only handles with the given role
    StartRole(DaemonRole),
    /// Kill only handles with the given role
    StopRole(DaemonRole),
}

impl FleetOp {
    /// Get a human-readable name for the operation.
    pub fn name(&self) -> &'static str {
        match self {
            FleetOp::StartAll => "start_all",
            FleetOp::StopAll => "stop_all",
            FleetOp::StartRole(_) => "start_role",
            FleetOp::StopRole(_) => "stop_role",
        }
    }

    /// True when the per-host call is `start`, false when it is `kill`.
    pub fn is_start(&self) -> bool {
        matches!(self, FleetOp::StartAll | FleetOp::StartRole(_))
    }

    /// Role restriction, if any.
    pub fn role_filter(&self) -> Option<DaemonRole> {
        match self {
            FleetOp::StartRole(role) | FleetOp::StopRole(role) => Some(*role),
            _ => None,
        }
    }
}

/// Outcome of one host's part in a fleet operation.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub host: String,
    pub role: DaemonRole,
    pub result: std::result::Result<(), LifecycleError>,
}

/// Aggregate result of a fleet operation.
///
/// Every targeted host appears exactly once; a caller can enumerate which
/// hosts failed and why, precisely enough to aim a retry or an alert at the
/// specific host or role.
#[derive(Debug, Clone)]
pub struct FleetOutcome {
    pub op: FleetOp,
    pub outcomes: Vec<HostOutcome>,
}

impl FleetOutcome {
    /// True when every targeted host succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Iterate over the failing entries.
    pub fn failures(&self) -> impl Iterator<Item = &HostOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Number of targeted hosts.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Snapshot of one fleet member for queries.
#[derive(Debug, Clone)]
pub struct DaemonInfo {
    pub host: String,
    pub role: DaemonRole,
    pub state: DaemonState,
}

/// Controller configuration options.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Overall deadline for one fleet operation. Hosts not settled by the
    /// deadline are reported as timeouts; settled hosts keep their outcome.
    pub operation_deadline: Option<Duration>,
    /// Upper bound on concurrently running per-host operations.
    pub max_concurrency: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            operation_deadline: None,
            max_concurrency: 16,
        }
    }
}

// ============================================================================
// Crate-Internal Types - Used by actor and facade
// ============================================================================

/// One registered (role, handle) pair. The fleet is an ordered collection of
/// these, keyed by `handle.host_name()`.
pub(super) struct FleetMember {
    pub role: DaemonRole,
    pub handle: Arc<dyn RemoteProcess>,
}

/// In-flight fleet operation tracking.
///
/// At most one exists at a time; registration and further fleet operations
/// are rejected while it is pending.
pub(super) struct PendingBatch {
    pub id: u64,
    pub op: FleetOp,
    /// Hosts targeted by this batch, in fleet order.
    pub targets: Vec<(String, DaemonRole)>,
    /// Outcomes received so far.
    pub outcomes: Vec<HostOutcome>,
    /// Response channel resolved when the batch settles or expires.
    pub resp: oneshot::Sender<Result<FleetOutcome>>,
    /// Absolute deadline, if the controller has one configured.
    pub deadline: Option<Instant>,
}

impl PendingBatch {
    /// True once every targeted host has reported.
    pub fn is_settled(&self) -> bool {
        self.outcomes.len() >= self.targets.len()
    }

    /// Targets that have not reported yet.
    pub fn unsettled(&self) -> Vec<(String, DaemonRole)> {
        self.targets
            .iter()
            .filter(|(host, _)| !self.outcomes.iter().any(|o| &o.host == host))
            .cloned()
            .collect()
    }
}
