use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

use herd_attribution::{ConfiguredIdentityResolver, IdentityResolver, RequestContext};
use herd_common::DaemonRole;
use herd_daemon::{RemoteDaemonHandle, RemoteProcess};
use herd_fleet_management::{ClusterConfig, ControllerOptions, FleetController, FleetOutcome};
use herd_remote_exec::{RemoteExecutor, RetryingExecutor, SshExecutor};

/// Herd Supervisor - remote daemon lifecycle management for a cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Restrict operations to one role (coordinator, worker, client_gateway)
    #[arg(short, long)]
    role: Option<String>,

    /// Caller identity for attributing operations (defaults to "supervisor")
    #[arg(long)]
    caller: Option<String>,

    /// Run duration in seconds (for testing)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Starting herd supervisor");
    info!("Config file: {}", args.config);

    let config = ClusterConfig::load_from_file(&args.config)?;
    info!("Loaded configuration for {} nodes", config.nodes.len());

    let role = args.role.as_deref().map(parse_role).transpose()?;

    // Attribution is explicit: no ambient lookup, the identity comes from
    // the flag or the configured fallback.
    let resolver = ConfiguredIdentityResolver::new(false, Some("supervisor".to_string()));
    let mut ctx = RequestContext::new();
    if let Some(ref caller) = args.caller {
        ctx = ctx.with_param(herd_attribution::CALLER_PARAM, caller);
    }
    let initiator = resolver
        .resolve(&ctx)
        .context("Failed to resolve caller identity")?;

    let controller = build_controller(&config).await?;

    let span = info_span!("fleet_ops", initiator = %initiator);
    run(controller, role, args.run_duration).instrument(span).await
}

/// Build the executor, one handle per node, and a populated controller.
async fn build_controller(config: &ClusterConfig) -> Result<FleetController> {
    let ssh = SshExecutor::new(config.ssh_options());
    let executor: Arc<dyn RemoteExecutor> = match config.retry_policy() {
        Some(policy) => Arc::new(RetryingExecutor::new(ssh, policy)),
        None => Arc::new(ssh),
    };

    let controller = FleetController::new(ControllerOptions {
        operation_deadline: config.supervisor.operation_deadline,
        max_concurrency: config.supervisor.max_concurrency,
    });

    let default_user = config.executor.ssh.user.as_deref();
    for node in &config.nodes {
        let handle = RemoteDaemonHandle::new(
            node.host_id(default_user),
            node.role,
            node.daemon_spec(),
            config.handle_options(),
            Arc::clone(&executor),
        );
        controller
            .add_handle(node.role, Arc::new(handle) as Arc<dyn RemoteProcess>)
            .await
            .with_context(|| format!("Failed to register node {}", node.host))?;
    }

    Ok(controller)
}

/// Start the fleet, wait for a shutdown signal (or the test-mode duration),
/// stop the fleet, and report.
async fn run(
    controller: FleetController,
    role: Option<DaemonRole>,
    run_duration: Option<u64>,
) -> Result<()> {
    let start_outcome = match role {
        Some(role) => controller.start_role(role).await?,
        None => controller.start_all().await?,
    };
    let start_ok = report_outcome("start", &start_outcome);

    if let Some(duration) = run_duration {
        info!("Running for {} seconds (test mode)", duration);
        tokio::time::sleep(tokio::time::Duration::from_secs(duration)).await;
    } else {
        setup_signal_handlers().await;
    }

    info!("Stopping fleet...");
    let stop_outcome = match role {
        Some(role) => controller.stop_role(role).await?,
        None => controller.stop_all().await?,
    };
    let stop_ok = report_outcome("stop", &stop_outcome);

    if !start_ok || !stop_ok {
        bail!("one or more hosts failed; see per-host outcomes above");
    }
    info!("All hosts settled cleanly");
    Ok(())
}

/// Log every host's outcome; true when all succeeded.
fn report_outcome(op: &str, outcome: &FleetOutcome) -> bool {
    for entry in &outcome.outcomes {
        match entry.result {
            Ok(()) => info!(
                host = %entry.host,
                role = %entry.role,
                "{} succeeded", op
            ),
            Err(ref e) => error!(
                host = %entry.host,
                role = %entry.role,
                "{} failed: {}", op, e
            ),
        }
    }
    outcome.all_succeeded()
}

fn parse_role(s: &str) -> Result<DaemonRole> {
    match s {
        "coordinator" => Ok(DaemonRole::Coordinator),
        "worker" => Ok(DaemonRole::Worker),
        "client_gateway" | "client-gateway" => Ok(DaemonRole::ClientGateway),
        other => bail!("unknown role: {} (expected coordinator, worker, or client_gateway)", other),
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    Ok(())
}

async fn setup_signal_handlers() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to create SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to create SIGINT handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
