//! Error types for remote daemon lifecycle operations.
//!
//! Two layers, matching the two seams of the system:
//!
//! - [`ExecError`] — what the remote-execution mechanism reports (a command
//!   could not be delivered or failed on the host).
//! - [`LifecycleError`] — what the lifecycle layer reports to callers
//!   (start/kill outcomes, fleet registration and lookup failures).
//!
//! Lifecycle errors are `Clone` so aggregate results can carry one entry per
//! host without consuming the originals.

use thiserror::Error;

/// Result type for executor operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Errors reported by a remote-execution mechanism.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The host could not be reached at all.
    #[error("connect failure for {host}: {reason}")]
    ConnectFailure { host: String, reason: String },

    /// The remote command was delivered but exited non-zero.
    #[error("command failed on {host}: `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: i32,
        stderr: String,
    },

    /// Local I/O failure while invoking the mechanism (e.g. the ssh binary
    /// is missing).
    #[error("I/O error for {host}: {source}")]
    Io {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The mechanism gave no answer within its own deadline.
    #[error("remote command timed out for {host}")]
    Timeout { host: String },
}

impl ExecError {
    pub fn connect_failure(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailure {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn command_failed(
        host: impl Into<String>,
        command: impl Into<String>,
        status: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            host: host.into(),
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }

    pub fn io(host: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            host: host.into(),
            source,
        }
    }

    pub fn timeout(host: impl Into<String>) -> Self {
        Self::Timeout { host: host.into() }
    }

    /// True when the failure means the host itself was unreachable, as
    /// opposed to the command failing on a reachable host.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, ExecError::ConnectFailure { .. })
    }
}

/// Errors reported by lifecycle operations (per-host and fleet-level).
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// Network/host unreachable.
    #[error("connect failure for {host}: {reason}")]
    ConnectFailure { host: String, reason: String },

    /// The launch command ran but the daemon did not come up.
    #[error("launch failure for {host}: {reason}")]
    LaunchFailure { host: String, reason: String },

    /// The terminate command ran but the daemon is still detected.
    #[error("terminate failure for {host}: {reason}")]
    TerminateFailure { host: String, reason: String },

    /// No confirmation within the deadline.
    #[error("timeout for {host} during {operation}")]
    Timeout { host: String, operation: String },

    /// The host identity is already registered in the fleet.
    #[error("duplicate host in fleet: {host}")]
    DuplicateHost { host: String },

    /// The fleet contains zero handles of the requested role.
    #[error("no handles with role {role} in fleet")]
    NoSuchRole { role: String },

    /// The operation is not legal right now (e.g. a fleet operation is
    /// already in flight, or the controller has shut down).
    #[error("operation not allowed: {operation} ({reason})")]
    OperationNotAllowed { operation: String, reason: String },

    /// The controller actor is gone (channel closed).
    #[error("controller unavailable: {context}")]
    ControllerUnavailable { context: String },
}

impl LifecycleError {
    pub fn connect_failure(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailure {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn launch_failure(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailure {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn terminate_failure(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TerminateFailure {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(host: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            host: host.into(),
            operation: operation.into(),
        }
    }

    pub fn duplicate_host(host: impl Into<String>) -> Self {
        Self::DuplicateHost { host: host.into() }
    }

    pub fn no_such_role(role: impl std::fmt::Display) -> Self {
        Self::NoSuchRole {
            role: role.to_string(),
        }
    }

    pub fn operation_not_allowed(
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::OperationNotAllowed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn controller_unavailable(context: impl Into<String>) -> Self {
        Self::ControllerUnavailable {
            context: context.into(),
        }
    }

    /// Maps a mechanism error into the lifecycle taxonomy for a `start`
    /// attempt. Connect failures stay connect failures; everything else is a
    /// launch failure.
    pub fn from_exec_on_start(host: impl Into<String>, err: &ExecError) -> Self {
        let host = host.into();
        match err {
            ExecError::ConnectFailure { reason, .. } => {
                Self::connect_failure(host, reason.clone())
            }
            ExecError::Timeout { .. } => Self::timeout(host, "launch"),
            other => Self::launch_failure(host, other.to_string()),
        }
    }

    /// Maps a mechanism error into the lifecycle taxonomy for a `kill`
    /// attempt.
    pub fn from_exec_on_kill(host: impl Into<String>, err: &ExecError) -> Self {
        let host = host.into();
        match err {
            ExecError::ConnectFailure { reason, .. } => {
                Self::connect_failure(host, reason.clone())
            }
            ExecError::Timeout { .. } => Self::timeout(host, "terminate"),
            other => Self::terminate_failure(host, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = LifecycleError::timeout("node-1", "start");
        assert!(matches!(err, LifecycleError::Timeout { .. }));
        assert_eq!(err.to_string(), "timeout for node-1 during start");

        let err = LifecycleError::duplicate_host("node-1");
        assert!(err.to_string().contains("duplicate host"));
    }

    #[test]
    fn test_exec_error_mapping_on_start() {
        let exec = ExecError::connect_failure("node-1", "no route to host");
        let mapped = LifecycleError::from_exec_on_start("node-1", &exec);
        assert!(matches!(mapped, LifecycleError::ConnectFailure { .. }));

        let exec = ExecError::command_failed("node-1", "daemon --up", 1, "port in use");
        let mapped = LifecycleError::from_exec_on_start("node-1", &exec);
        match mapped {
            LifecycleError::LaunchFailure { host, reason } => {
                assert_eq!(host, "node-1");
                assert!(reason.contains("port in use"));
            }
            e => panic!("expected LaunchFailure, got {:?}", e),
        }
    }

    #[test]
    fn test_exec_error_mapping_on_kill() {
        let exec = ExecError::command_failed("node-2", "daemon --down", 1, "still running");
        let mapped = LifecycleError::from_exec_on_kill("node-2", &exec);
        assert!(matches!(mapped, LifecycleError::TerminateFailure { .. }));
    }

    #[test]
    fn test_lifecycle_error_is_clone() {
        let err = LifecycleError::no_such_role("worker");
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
