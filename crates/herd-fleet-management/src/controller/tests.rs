//! Unit tests for the fleet controller module.

use super::*;
use async_trait::async_trait;
use herd_common::{DaemonRole, LifecycleError, LifecycleResult};
use herd_daemon::RemoteProcess;
use herd_daemon_state::DaemonState;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

/// Scripted fleet member: records calls, optionally fails or dawdles.
struct MockDaemon {
    host: String,
    role: DaemonRole,
    state: Mutex<DaemonState>,
    fail_start: bool,
    start_delay: Duration,
    start_calls: AtomicU32,
    kill_calls: AtomicU32,
}

impl MockDaemon {
    fn new(host: &str, role: DaemonRole) -> Self {
        Self {
            host: host.to_string(),
            role,
            state: Mutex::new(DaemonState::NotStarted),
            fail_start: false,
            start_delay: Duration::ZERO,
            start_calls: AtomicU32::new(0),
            kill_calls: AtomicU32::new(0),
        }
    }

    fn failing(host: &str, role: DaemonRole) -> Self {
        Self {
            fail_start: true,
            ..Self::new(host, role)
        }
    }

    fn slow(host: &str, role: DaemonRole, delay: Duration) -> Self {
        Self {
            start_delay: delay,
            ..Self::new(host, role)
        }
    }

    fn set_state(&self, state: DaemonState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[async_trait]
impl RemoteProcess for MockDaemon {
    fn host_name(&self) -> &str {
        &self.host
    }

    fn role(&self) -> DaemonRole {
        self.role
    }

    fn state(&self) -> DaemonState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn start(&self) -> LifecycleResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            sleep(self.start_delay).await;
        }
        if self.fail_start {
            self.set_state(DaemonState::Failed);
            Err(LifecycleError::connect_failure(&self.host, "no route"))
        } else {
            self.set_state(DaemonState::Running);
            Ok(())
        }
    }

    async fn kill(&self) -> LifecycleResult<()> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(DaemonState::Stopped);
        Ok(())
    }
}

async fn controller_with(
    options: ControllerOptions,
    daemons: &[Arc<MockDaemon>],
) -> FleetController {
    let controller = FleetController::new(options);
    for daemon in daemons {
        controller
            .add_handle(daemon.role(), Arc::clone(daemon) as Arc<dyn RemoteProcess>)
            .await
            .unwrap();
    }
    controller
}

#[tokio::test]
async fn test_start_all_reports_every_host() {
    let daemons = vec![
        Arc::new(MockDaemon::new("node-1", DaemonRole::Coordinator)),
        Arc::new(MockDaemon::new("node-2", DaemonRole::Worker)),
        Arc::new(MockDaemon::new("node-3", DaemonRole::Worker)),
    ];
    let controller = controller_with(ControllerOptions::default(), &daemons).await;

    let outcome = controller.start_all().await.unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.len(), 3);
    for daemon in &daemons {
        assert_eq!(daemon.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(daemon.state(), DaemonState::Running);
    }
}

#[tokio::test]
async fn test_one_failure_never_aborts_the_others() {
    let daemons = vec![
        Arc::new(MockDaemon::new("node-1", DaemonRole::Coordinator)),
        Arc::new(MockDaemon::failing("node-2", DaemonRole::Worker)),
        Arc::new(MockDaemon::new("node-3", DaemonRole::Worker)),
    ];
    let controller = controller_with(ControllerOptions::default(), &daemons).await;

    let outcome = controller.start_all().await.unwrap();
    assert!(!outcome.all_succeeded());
    assert_eq!(outcome.len(), 3, "no host result may be omitted");

    let failures: Vec<_> = outcome.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].host, "node-2");
    assert!(matches!(
        failures[0].result,
        Err(LifecycleError::ConnectFailure { .. })
    ));
}

#[tokio::test]
async fn test_start_role_with_no_members_is_no_such_role() {
    let daemons = vec![Arc::new(MockDaemon::new("node-1", DaemonRole::Worker))];
    let controller = controller_with(ControllerOptions::default(), &daemons).await;

    let err = controller.start_role(DaemonRole::ClientGateway).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NoSuchRole { .. }));

    // No remote I/O happened
    assert_eq!(daemons[0].start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_role_targets_only_that_role() {
    let coordinator = Arc::new(MockDaemon::new("host1", DaemonRole::Coordinator));
    let worker_a = Arc::new(MockDaemon::new("host2", DaemonRole::Worker));
    let worker_b = Arc::new(MockDaemon::new("host3", DaemonRole::Worker));
    let daemons = vec![
        Arc::clone(&coordinator),
        Arc::clone(&worker_a),
        Arc::clone(&worker_b),
    ];
    let controller = controller_with(ControllerOptions::default(), &daemons).await;

    let outcome = controller.stop_role(DaemonRole::Worker).await.unwrap();
    assert_eq!(outcome.len(), 2, "aggregate of exactly the two workers");
    assert!(outcome.all_succeeded());

    assert_eq!(coordinator.kill_calls.load(Ordering::SeqCst), 0);
    assert_eq!(worker_a.kill_calls.load(Ordering::SeqCst), 1);
    assert_eq!(worker_b.kill_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_host_rejected() {
    let controller = FleetController::new(ControllerOptions::default());
    let first = Arc::new(MockDaemon::new("node-1", DaemonRole::Worker));
    let second = Arc::new(MockDaemon::new("node-1", DaemonRole::Coordinator));

    controller
        .add_handle(first.role(), first as Arc<dyn RemoteProcess>)
        .await
        .unwrap();
    let err = controller
        .add_handle(second.role(), second as Arc<dyn RemoteProcess>)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::DuplicateHost { .. }));
}

#[tokio::test]
async fn test_empty_fleet_start_all_settles_trivially() {
    let controller = FleetController::new(ControllerOptions::default());

    let outcome = controller.start_all().await.unwrap();
    assert!(outcome.is_empty());
    assert!(outcome.all_succeeded());
}

#[tokio::test]
async fn test_registration_rejected_during_fanout() {
    let slow = Arc::new(MockDaemon::slow(
        "node-1",
        DaemonRole::Worker,
        Duration::from_millis(200),
    ));
    let controller = controller_with(ControllerOptions::default(), &[Arc::clone(&slow)]).await;

    let runner = controller.clone();
    let op = tokio::spawn(async move { runner.start_all().await });
    sleep(Duration::from_millis(50)).await;

    let late = Arc::new(MockDaemon::new("node-2", DaemonRole::Worker));
    let err = controller
        .add_handle(late.role(), late as Arc<dyn RemoteProcess>)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::OperationNotAllowed { .. }));

    op.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_overlapping_fleet_ops_rejected() {
    let slow = Arc::new(MockDaemon::slow(
        "node-1",
        DaemonRole::Worker,
        Duration::from_millis(200),
    ));
    let controller = controller_with(ControllerOptions::default(), &[slow]).await;

    let runner = controller.clone();
    let op = tokio::spawn(async move { runner.start_all().await });
    sleep(Duration::from_millis(50)).await;

    let err = controller.stop_all().await.unwrap_err();
    assert!(matches!(err, LifecycleError::OperationNotAllowed { .. }));

    op.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_deadline_keeps_settled_outcomes_and_times_out_the_rest() {
    let fast = Arc::new(MockDaemon::new("fast", DaemonRole::Worker));
    let slow = Arc::new(MockDaemon::slow(
        "slow",
        DaemonRole::Worker,
        Duration::from_millis(500),
    ));
    let controller = controller_with(
        ControllerOptions {
            operation_deadline: Some(Duration::from_millis(100)),
            ..ControllerOptions::default()
        },
        &[Arc::clone(&fast), Arc::clone(&slow)],
    )
    .await;

    let outcome = controller.start_all().await.unwrap();
    assert_eq!(outcome.len(), 2, "partial progress is not dropped");
    assert!(!outcome.all_succeeded());

    let fast_entry = outcome.outcomes.iter().find(|o| o.host == "fast").unwrap();
    assert!(fast_entry.result.is_ok());

    let slow_entry = outcome.outcomes.iter().find(|o| o.host == "slow").unwrap();
    assert!(matches!(
        slow_entry.result,
        Err(LifecycleError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_controller_accepts_next_op_after_deadline() {
    let slow = Arc::new(MockDaemon::slow(
        "slow",
        DaemonRole::Worker,
        Duration::from_millis(300),
    ));
    let controller = controller_with(
        ControllerOptions {
            operation_deadline: Some(Duration::from_millis(50)),
            ..ControllerOptions::default()
        },
        &[Arc::clone(&slow)],
    )
    .await;

    let outcome = controller.start_all().await.unwrap();
    assert!(!outcome.all_succeeded());

    // The expired batch is closed; the controller is free again even though
    // the straggler task is still running.
    let outcome = controller.stop_all().await.unwrap();
    assert_eq!(outcome.len(), 1);
}

#[tokio::test]
async fn test_fleet_info_reflects_states() {
    let daemons = vec![
        Arc::new(MockDaemon::new("node-1", DaemonRole::Coordinator)),
        Arc::new(MockDaemon::new("node-2", DaemonRole::Worker)),
    ];
    let controller = controller_with(ControllerOptions::default(), &daemons).await;

    let info = controller.fleet_info().await.unwrap();
    assert_eq!(info.len(), 2);
    assert!(info.iter().all(|i| i.state == DaemonState::NotStarted));

    controller.start_all().await.unwrap();
    let info = controller.fleet_info().await.unwrap();
    assert!(info.iter().all(|i| i.state == DaemonState::Running));
}

#[tokio::test]
async fn test_fleet_info_served_during_fanout() {
    let slow = Arc::new(MockDaemon::slow(
        "node-1",
        DaemonRole::Worker,
        Duration::from_millis(300),
    ));
    let controller = controller_with(ControllerOptions::default(), &[slow]).await;

    let runner = controller.clone();
    let op = tokio::spawn(async move { runner.start_all().await });
    sleep(Duration::from_millis(50)).await;

    // The query must not wait for the in-flight batch
    let info = tokio::time::timeout(Duration::from_millis(100), controller.fleet_info())
        .await
        .expect("fleet_info blocked behind fan-out")
        .unwrap();
    assert_eq!(info.len(), 1);

    op.await.unwrap().unwrap();
}
