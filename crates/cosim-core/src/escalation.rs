//! Stop sequence for a launched peer process.
//!
//! Once the session is over the peer should exit on its own. If it does not,
//! the supervisor escalates one step per expired wait:
//!
//! ```text
//! AwaitExit ──timeout──> AwaitGraceful ──timeout──> AwaitTerminate
//!                        (request END)              (SIGTERM)
//!     ──timeout──> AwaitKill ──timeout──> Unstoppable
//!                  (SIGKILL)
//!
//! any Await* ──exit──> Exited
//! ```
//!
//! The state machine owns no process. The runtime performs each action and
//! reports back whether the child exited before the wait expired.

use std::time::Duration;

use crate::config::SupervisorConfig;

/// Where the stop sequence stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// Waiting for a natural exit.
    AwaitExit,
    /// Graceful shutdown requested over the protocol.
    AwaitGraceful,
    /// Terminate signal sent.
    AwaitTerminate,
    /// Kill signal sent.
    AwaitKill,
    /// The child exited with this code (`None` if killed by a signal).
    Exited(Option<i32>),
    /// The child survived the kill signal.
    Unstoppable,
}

/// What the runtime must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    /// Ask the session to shut down gracefully, then wait.
    RequestShutdown {
        /// How long to wait afterwards.
        wait: Duration,
    },
    /// Send the terminate signal, then wait.
    Terminate {
        /// How long to wait afterwards.
        wait: Duration,
    },
    /// Send the kill signal, then wait.
    Kill {
        /// How long to wait afterwards.
        wait: Duration,
    },
    /// Nothing left to try.
    GiveUp,
}

/// Linear escalation state machine with one timeout per state.
#[derive(Debug, Clone)]
pub struct Escalation {
    state: EscalationState,
    config: SupervisorConfig,
}

impl Escalation {
    /// Start in [`EscalationState::AwaitExit`].
    pub fn new(config: SupervisorConfig) -> Self {
        Self { state: EscalationState::AwaitExit, config }
    }

    /// Current state.
    pub fn state(&self) -> EscalationState {
        self.state
    }

    /// How long to wait for a natural exit before the first step.
    pub fn initial_wait(&self) -> Duration {
        self.config.exit_wait
    }

    /// Whether the sequence is over.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, EscalationState::Exited(_) | EscalationState::Unstoppable)
    }

    /// The child exited.
    pub fn on_exit(&mut self, code: Option<i32>) {
        if !self.is_finished() {
            self.state = EscalationState::Exited(code);
        }
    }

    /// The current wait expired with the child still running.
    pub fn on_timeout(&mut self) -> EscalationAction {
        let (next, action) = match self.state {
            EscalationState::AwaitExit => (
                EscalationState::AwaitGraceful,
                EscalationAction::RequestShutdown { wait: self.config.graceful_wait },
            ),
            EscalationState::AwaitGraceful => (
                EscalationState::AwaitTerminate,
                EscalationAction::Terminate { wait: self.config.terminate_wait },
            ),
            EscalationState::AwaitTerminate => (
                EscalationState::AwaitKill,
                EscalationAction::Kill { wait: self.config.kill_wait },
            ),
            EscalationState::AwaitKill | EscalationState::Unstoppable => {
                (EscalationState::Unstoppable, EscalationAction::GiveUp)
            },
            EscalationState::Exited(code) => {
                (EscalationState::Exited(code), EscalationAction::GiveUp)
            },
        };
        self.state = next;
        action
    }
}
