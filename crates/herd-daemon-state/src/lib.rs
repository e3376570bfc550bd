use chrono::{DateTime, Utc};
use herd_common::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one remote daemon, as tracked by its handle.
///
/// The handle owns this exclusively; callers observe it but never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    /// No start has ever been attempted through this handle
    NotStarted,
    /// Launch issued, liveness not yet confirmed
    Starting,
    /// Liveness confirmed
    Running,
    /// Terminate issued, death not yet confirmed
    Stopping,
    /// Termination confirmed
    Stopped,
    /// Last operation failed; remote state is whatever the failure left it
    Failed,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonState::NotStarted => write!(f, "not_started"),
            DaemonState::Starting => write!(f, "starting"),
            DaemonState::Running => write!(f, "running"),
            DaemonState::Stopping => write!(f, "stopping"),
            DaemonState::Stopped => write!(f, "stopped"),
            DaemonState::Failed => write!(f, "failed"),
        }
    }
}

impl DaemonState {
    /// Check if the daemon is in a terminal state (only `start` leaves it).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DaemonState::NotStarted | DaemonState::Stopped | DaemonState::Failed
        )
    }

    /// Check if the daemon is mid-transition.
    pub fn is_transitional(&self) -> bool {
        matches!(self, DaemonState::Starting | DaemonState::Stopping)
    }
}

/// A recorded state transition with timestamp and optional reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: DaemonState,
    pub to_state: DaemonState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Maximum retained transitions per daemon.
const HISTORY_CAP: usize = 100;

/// State machine that owns one daemon's lifecycle state and validates
/// transitions against the legality table.
#[derive(Debug, Clone)]
pub struct DaemonStateMachine {
    host: String,
    current_state: DaemonState,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl DaemonStateMachine {
    /// Create a new state machine for the daemon on `host`.
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            current_state: DaemonState::NotStarted,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    /// Get the current state.
    pub fn current_state(&self) -> DaemonState {
        self.current_state
    }

    /// Get the recorded transition history (bounded).
    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// Get the time of the last transition.
    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from the current state to `target` is valid.
    pub fn is_valid_transition(&self, target: DaemonState) -> bool {
        match (self.current_state, target) {
            // start is legal from NotStarted, Stopped, Failed
            (DaemonState::NotStarted, DaemonState::Starting) => true,
            (DaemonState::Stopped, DaemonState::Starting) => true,
            (DaemonState::Failed, DaemonState::Starting) => true,

            // From Starting
            (DaemonState::Starting, DaemonState::Running) => true,
            (DaemonState::Starting, DaemonState::Failed) => true,
            (DaemonState::Starting, DaemonState::Stopping) => true, // kill during startup

            // From Running
            (DaemonState::Running, DaemonState::Stopping) => true,
            (DaemonState::Running, DaemonState::Failed) => true,

            // From Stopping
            (DaemonState::Stopping, DaemonState::Stopped) => true,
            (DaemonState::Stopping, DaemonState::Failed) => true,

            // kill is legal on a Failed daemon
            (DaemonState::Failed, DaemonState::Stopping) => true,

            // Same state (no-op)
            (state, target) if state == target => true,

            // Everything else is invalid
            _ => false,
        }
    }

    /// Transition to `target` with an optional reason.
    ///
    /// An invalid transition returns `OperationNotAllowed` and leaves the
    /// state untouched.
    pub fn transition_to(
        &mut self,
        target: DaemonState,
        reason: Option<String>,
    ) -> LifecycleResult<()> {
        if !self.is_valid_transition(target) {
            return Err(LifecycleError::operation_not_allowed(
                format!("transition to {}", target),
                format!("{} is in state {}", self.host, self.current_state),
            ));
        }

        self.record(target, reason);
        Ok(())
    }

    /// Convenience transitions used by the handle.
    pub fn mark_starting(&mut self) -> LifecycleResult<()> {
        self.transition_to(DaemonState::Starting, Some("start requested".to_string()))
    }

    pub fn mark_running(&mut self) -> LifecycleResult<()> {
        self.transition_to(DaemonState::Running, Some("liveness confirmed".to_string()))
    }

    pub fn mark_stopping(&mut self) -> LifecycleResult<()> {
        self.transition_to(DaemonState::Stopping, Some("stop requested".to_string()))
    }

    pub fn mark_stopped(&mut self) -> LifecycleResult<()> {
        self.transition_to(DaemonState::Stopped, Some("termination confirmed".to_string()))
    }

    pub fn mark_failed(&mut self, reason: String) -> LifecycleResult<()> {
        self.transition_to(DaemonState::Failed, Some(reason))
    }

    /// Reconciliation setter: the daemon was observed dead on the remote
    /// host, regardless of what the cache said. The remote truth wins and
    /// the legality table is bypassed; the correction is kept in history.
    pub fn force_stopped(&mut self, observation: &str) {
        self.record(
            DaemonState::Stopped,
            Some(format!("observed: {}", observation)),
        );
    }

    /// Reconciliation setter for an observed failure.
    pub fn force_failed(&mut self, observation: &str) {
        self.record(
            DaemonState::Failed,
            Some(format!("observed: {}", observation)),
        );
    }

    /// Reconciliation setter: the daemon was observed alive even though the
    /// cache said otherwise (e.g. a fresh handle after a supervisor restart).
    pub fn force_running(&mut self, observation: &str) {
        self.record(
            DaemonState::Running,
            Some(format!("observed: {}", observation)),
        );
    }

    /// Check if `start` may fire from the current state.
    pub fn can_start(&self) -> bool {
        matches!(
            self.current_state,
            DaemonState::NotStarted | DaemonState::Stopped | DaemonState::Failed
        )
    }

    /// Check if `kill` may fire from the current state.
    pub fn can_kill(&self) -> bool {
        matches!(
            self.current_state,
            DaemonState::Running | DaemonState::Starting | DaemonState::Failed
        )
    }

    /// Get the most recent transition.
    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.last()
    }

    fn record(&mut self, target: DaemonState, reason: Option<String>) {
        let now = Utc::now();
        let from_state = self.current_state;

        self.state_history.push(StateTransition {
            from_state,
            to_state: target,
            timestamp: now,
            reason,
        });
        if self.state_history.len() > HISTORY_CAP {
            self.state_history.remove(0);
        }

        self.current_state = target;
        self.last_transition_time = now;

        tracing::debug!(
            "daemon on {} transitioned from {} to {}",
            self.host,
            from_state,
            target
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_creation() {
        let sm = DaemonStateMachine::new("node-1");
        assert_eq!(sm.current_state(), DaemonState::NotStarted);
        assert!(sm.state_history().is_empty());
    }

    #[test]
    fn test_full_lifecycle_transitions() {
        let mut sm = DaemonStateMachine::new("node-1");

        assert!(sm.mark_starting().is_ok());
        assert_eq!(sm.current_state(), DaemonState::Starting);

        assert!(sm.mark_running().is_ok());
        assert_eq!(sm.current_state(), DaemonState::Running);

        assert!(sm.mark_stopping().is_ok());
        assert!(sm.mark_stopped().is_ok());
        assert_eq!(sm.current_state(), DaemonState::Stopped);

        // Restart after stop
        assert!(sm.mark_starting().is_ok());
        assert_eq!(sm.current_state(), DaemonState::Starting);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut sm = DaemonStateMachine::new("node-1");

        // NotStarted -> Running skips Starting
        assert!(!sm.is_valid_transition(DaemonState::Running));
        let err = sm.transition_to(DaemonState::Running, None).unwrap_err();
        assert!(matches!(err, LifecycleError::OperationNotAllowed { .. }));
        assert_eq!(sm.current_state(), DaemonState::NotStarted);

        // NotStarted -> Stopping
        assert!(sm.transition_to(DaemonState::Stopping, None).is_err());
    }

    #[test]
    fn test_no_exit_from_terminal_except_start() {
        let mut sm = DaemonStateMachine::new("node-1");
        sm.mark_starting().unwrap();
        sm.mark_failed("launch failed".to_string()).unwrap();

        assert!(!sm.is_valid_transition(DaemonState::Running));
        assert!(sm.is_valid_transition(DaemonState::Starting));
        // kill of a failed daemon is legal
        assert!(sm.is_valid_transition(DaemonState::Stopping));
    }

    #[test]
    fn test_can_start_and_can_kill() {
        let mut sm = DaemonStateMachine::new("node-1");
        assert!(sm.can_start());
        assert!(!sm.can_kill());

        sm.mark_starting().unwrap();
        assert!(!sm.can_start());
        assert!(sm.can_kill()); // cancel startup

        sm.mark_running().unwrap();
        assert!(!sm.can_start());
        assert!(sm.can_kill());

        sm.mark_stopping().unwrap();
        sm.mark_stopped().unwrap();
        assert!(sm.can_start());
        assert!(!sm.can_kill());
    }

    #[test]
    fn test_force_stopped_bypasses_legality() {
        let mut sm = DaemonStateMachine::new("node-1");
        // Stopped is not normally reachable from NotStarted, but an observed
        // dead daemon overrides the cache.
        sm.force_stopped("liveness probe reported dead");
        assert_eq!(sm.current_state(), DaemonState::Stopped);

        let last = sm.last_transition().unwrap();
        assert!(last.reason.as_deref().unwrap().starts_with("observed:"));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sm = DaemonStateMachine::new("node-1");
        for _ in 0..120 {
            sm.force_stopped("probe");
        }
        assert_eq!(sm.state_history().len(), HISTORY_CAP);
    }

    #[test]
    fn test_state_properties() {
        assert!(DaemonState::NotStarted.is_terminal());
        assert!(DaemonState::Stopped.is_terminal());
        assert!(DaemonState::Failed.is_terminal());
        assert!(DaemonState::Starting.is_transitional());
        assert!(DaemonState::Stopping.is_transitional());
        assert!(!DaemonState::Running.is_terminal());
    }
}
