//! Cluster configuration validation.

use super::ClusterConfig;
use anyhow::{bail, Result};
use std::collections::HashSet;

/// Validate a loaded configuration before anything is built from it.
pub fn validate_config(config: &ClusterConfig) -> Result<()> {
    if config.nodes.is_empty() {
        bail!("configuration must declare at least one node");
    }

    if config.supervisor.max_concurrency == 0 {
        bail!("supervisor.max_concurrency must be at least 1");
    }

    let mut seen_hosts = HashSet::new();
    for node in &config.nodes {
        if node.host.trim().is_empty() {
            bail!("node host must not be empty");
        }
        if !seen_hosts.insert(node.host.as_str()) {
            bail!("duplicate node host: {}", node.host);
        }

        for (field, value) in [
            ("start_command", &node.daemon.start_command),
            ("stop_command", &node.daemon.stop_command),
            ("liveness_command", &node.daemon.liveness_command),
        ] {
            if value.trim().is_empty() {
                bail!("node {}: daemon.{} must not be empty", node.host, field);
            }
        }
    }

    if config.defaults.start_timeout.is_zero()
        || config.defaults.stop_timeout.is_zero()
        || config.defaults.poll_interval.is_zero()
    {
        bail!("defaults timeouts and poll_interval must be non-zero");
    }

    if let Some(deadline) = config.supervisor.operation_deadline {
        if deadline.is_zero() {
            bail!("supervisor.operation_deadline must be non-zero when set");
        }
    }

    if let Some(ref retry) = config.executor.retry {
        if retry.max_attempts == 0 {
            bail!("executor.retry.max_attempts must be at least 1");
        }
        if retry.backoff_rate < 1.0 {
            bail!("executor.retry.backoff_rate must be >= 1.0");
        }
    }

    if config.executor.ssh.binary.trim().is_empty() {
        bail!("executor.ssh.binary must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::*;

    fn valid_config() -> ClusterConfig {
        ClusterConfig::load_from_string(
            r#"
supervisor:
  log_level: info
nodes:
  - host: node-1
    role: worker
    daemon:
      start_command: "daemon --up"
      stop_command: "daemon --down"
      liveness_command: "daemon --alive"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_nodes_rejected() {
        let mut config = valid_config();
        config.nodes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_hosts_rejected() {
        let mut config = valid_config();
        let dup = config.nodes[0].clone();
        config.nodes.push(dup);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node host"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = valid_config();
        config.nodes[0].daemon.liveness_command = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("liveness_command"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = valid_config();
        config.supervisor.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_retry_rejected() {
        let mut config = valid_config();
        config.executor.retry = Some(RetryConfig {
            max_attempts: 0,
            initial_delay: std::time::Duration::from_secs(1),
            backoff_rate: 2.0,
            max_delay: std::time::Duration::from_secs(30),
        });
        assert!(config.validate().is_err());

        config.executor.retry = Some(RetryConfig {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_secs(1),
            backoff_rate: 0.5,
            max_delay: std::time::Duration::from_secs(30),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = valid_config();
        config.defaults.poll_interval = std::time::Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
