use anyhow::{Context, Result};
use herd_common::{DaemonRole, DaemonSpec, HostId};
use herd_daemon::HandleOptions;
use herd_remote_exec::{RetryPolicy, SshOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod validation;

/// Top-level cluster configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub defaults: DaemonTimingDefaults,
    pub nodes: Vec<NodeConfig>,
}

/// Supervisor-wide options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Overall deadline for one fleet operation; hosts unsettled past it are
    /// reported as timeouts.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub operation_deadline: Option<Duration>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Remote-execution mechanism configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub ssh: SshConfig,
    /// Delivery retry policy; absent means no retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// ssh mechanism settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Default remote user for nodes that do not set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_ssh_binary")]
    pub binary: String,
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_command_timeout", with = "duration_serde")]
    pub command_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: None,
            binary: default_ssh_binary(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

/// Delivery retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f32,
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,
}

/// Per-daemon timing defaults, applied to every node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonTimingDefaults {
    #[serde(default = "default_start_timeout", with = "duration_serde")]
    pub start_timeout: Duration,
    #[serde(default = "default_stop_timeout", with = "duration_serde")]
    pub stop_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for DaemonTimingDefaults {
    fn default() -> Self {
        Self {
            start_timeout: default_start_timeout(),
            stop_timeout: default_stop_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// One cluster node and its daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Overrides `executor.ssh.user` for this node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    pub role: DaemonRole,
    pub daemon: DaemonCommands,
}

/// Daemon command strings for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonCommands {
    pub start_command: String,
    pub stop_command: String,
    pub liveness_command: String,
}

impl ClusterConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: ClusterConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Nodes with the given role
    pub fn nodes_with_role(&self, role: DaemonRole) -> Vec<&NodeConfig> {
        self.nodes.iter().filter(|n| n.role == role).collect()
    }

    /// Handle timing options from the configured defaults
    pub fn handle_options(&self) -> HandleOptions {
        HandleOptions {
            start_timeout: self.defaults.start_timeout,
            stop_timeout: self.defaults.stop_timeout,
            poll_interval: self.defaults.poll_interval,
        }
    }

    /// ssh mechanism options
    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            binary: self.executor.ssh.binary.clone(),
            connect_timeout: self.executor.ssh.connect_timeout,
            command_timeout: self.executor.ssh.command_timeout,
        }
    }

    /// Delivery retry policy, if configured
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.executor.retry.as_ref().map(|r| RetryPolicy {
            max_attempts: r.max_attempts,
            initial_delay: r.initial_delay,
            backoff_rate: r.backoff_rate,
            max_delay: r.max_delay,
        })
    }
}

impl NodeConfig {
    /// Host identity for this node, with the executor-wide user as fallback
    pub fn host_id(&self, default_user: Option<&str>) -> HostId {
        let mut host = HostId::new(&self.host).with_port(self.port);
        if let Some(user) = self.user.as_deref().or(default_user) {
            host = host.with_user(user);
        }
        if let Some(ref identity_file) = self.identity_file {
            host = host.with_credential_ref(identity_file);
        }
        host
    }

    /// Daemon spec for this node
    pub fn daemon_spec(&self) -> DaemonSpec {
        DaemonSpec::new(
            &self.daemon.start_command,
            &self.daemon.stop_command,
            &self.daemon.liveness_command,
        )
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrency() -> usize {
    16
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_rate() -> f32 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(mins * 60))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

// Custom serialization for Option<Duration>
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&format!("{}s", d.as_secs())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => super::duration_serde::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
supervisor:
  log_level: debug
  operation_deadline: 60s
  max_concurrency: 8
executor:
  ssh:
    user: cluster
    connect_timeout: 5s
  retry:
    max_attempts: 3
    initial_delay: 1s
    backoff_rate: 2.0
defaults:
  start_timeout: 20s
  stop_timeout: 10s
  poll_interval: 250ms
nodes:
  - host: node-1.example.test
    role: coordinator
    daemon:
      start_command: "cluster-daemon --role coordinator --daemonize"
      stop_command: "cluster-daemon --shutdown"
      liveness_command: "pgrep -f cluster-daemon"
  - host: node-2.example.test
    port: 2222
    user: admin
    role: worker
    daemon:
      start_command: "cluster-daemon --role worker --daemonize"
      stop_command: "cluster-daemon --shutdown"
      liveness_command: "pgrep -f cluster-daemon"
"#;

    #[test]
    fn test_load_sample_config() {
        let config = ClusterConfig::load_from_string(SAMPLE).unwrap();

        assert_eq!(config.supervisor.log_level, "debug");
        assert_eq!(
            config.supervisor.operation_deadline,
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.supervisor.max_concurrency, 8);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].role, DaemonRole::Coordinator);
        assert_eq!(config.defaults.poll_interval, Duration::from_millis(250));
        assert_eq!(config.nodes_with_role(DaemonRole::Worker).len(), 1);
    }

    #[test]
    fn test_node_host_id_user_fallback() {
        let config = ClusterConfig::load_from_string(SAMPLE).unwrap();
        let default_user = config.executor.ssh.user.as_deref();

        let first = config.nodes[0].host_id(default_user);
        assert_eq!(first.user(), Some("cluster"));
        assert_eq!(first.port(), 22);

        // Per-node user wins over the executor-wide default
        let second = config.nodes[1].host_id(default_user);
        assert_eq!(second.user(), Some("admin"));
        assert_eq!(second.port(), 2222);
    }

    #[test]
    fn test_duration_parsing() {
        use super::duration_serde::parse_duration;

        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("abcs").is_err());
    }

    #[test]
    fn test_retry_policy_conversion() {
        let config = ClusterConfig::load_from_string(SAMPLE).unwrap();
        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));

        let mut config = config;
        config.executor.retry = None;
        assert!(config.retry_policy().is_none());
    }

    #[test]
    fn test_load_from_file_round_trip() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);

        let config = ClusterConfig::load_from_file(&path).unwrap();
        assert_eq!(config.nodes.len(), 2);

        assert!(ClusterConfig::load_from_file(dir.path().join("missing.yaml")).is_err());
    }
}
