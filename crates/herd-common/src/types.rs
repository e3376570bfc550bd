//! Core domain types for the herd supervisor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a remote host, including the connection parameters the
/// executor mechanism needs to reach it.
///
/// Immutable once a handle is constructed from it. The hostname doubles as
/// the fleet key: two handles with the same hostname are the same node.
///
/// # Example
/// ```
/// use herd_common::HostId;
///
/// let host = HostId::new("node-1.example.test").with_port(2222).with_user("cluster");
/// assert_eq!(host.name(), "node-1.example.test");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId {
    hostname: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    /// Reference to a credential (e.g. an identity file path); the core
    /// never reads it, only hands it to the executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    credential_ref: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl HostId {
    /// Creates a new host identity with the default port and no user.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: default_port(),
            user: None,
            credential_ref: None,
        }
    }

    /// Sets the connection port (fluent API).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the remote user (fluent API).
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the credential reference (fluent API).
    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.credential_ref = Some(credential_ref.into());
        self
    }

    /// Returns the hostname used as the fleet key.
    pub fn name(&self) -> &str {
        &self.hostname
    }

    /// Returns the connection port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the remote user, if configured.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the credential reference, if configured.
    pub fn credential_ref(&self) -> Option<&str> {
        self.credential_ref.as_deref()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hostname)
    }
}

/// Role of a daemon in the cluster.
///
/// A closed set: role-based fan-out stays exhaustive and compiler-checked.
/// Extending the cluster with a new daemon kind means adding a variant here,
/// not registering a string at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonRole {
    /// Cluster coordinator (metadata/control plane)
    Coordinator,
    /// Storage/compute worker
    Worker,
    /// Client-facing gateway
    ClientGateway,
}

impl DaemonRole {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonRole::Coordinator => "coordinator",
            DaemonRole::Worker => "worker",
            DaemonRole::ClientGateway => "client_gateway",
        }
    }
}

impl fmt::Display for DaemonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to start, stop, and observe the daemon on a node.
///
/// The command strings are owned by the executor mechanism; the core never
/// interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSpec {
    /// Command that launches the daemon (must return once launch is issued).
    pub start_command: String,
    /// Command that asks the daemon to terminate.
    pub stop_command: String,
    /// Command whose exit status reports daemon liveness (0 = alive).
    pub liveness_command: String,
}

impl DaemonSpec {
    pub fn new(
        start_command: impl Into<String>,
        stop_command: impl Into<String>,
        liveness_command: impl Into<String>,
    ) -> Self {
        Self {
            start_command: start_command.into(),
            stop_command: stop_command.into(),
            liveness_command: liveness_command.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_id_accessors() {
        let host = HostId::new("node-1").with_port(2222).with_user("cluster");
        assert_eq!(host.name(), "node-1");
        assert_eq!(host.port(), 2222);
        assert_eq!(host.user(), Some("cluster"));
        assert_eq!(host.credential_ref(), None);
        assert_eq!(host.to_string(), "node-1");
    }

    #[test]
    fn test_host_id_defaults() {
        let host = HostId::new("node-2");
        assert_eq!(host.port(), 22);
        assert_eq!(host.user(), None);
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(DaemonRole::Coordinator.as_str(), "coordinator");
        assert_eq!(DaemonRole::Worker.to_string(), "worker");

        let parsed: DaemonRole = serde_yaml::from_str("client_gateway").unwrap();
        assert_eq!(parsed, DaemonRole::ClientGateway);
    }

    #[test]
    fn test_role_pattern_matching() {
        let role = DaemonRole::Worker;

        let result = match role {
            DaemonRole::Coordinator => "coordinator",
            DaemonRole::Worker => "worker",
            DaemonRole::ClientGateway => "client_gateway",
        };

        assert_eq!(result, "worker");
    }
}
