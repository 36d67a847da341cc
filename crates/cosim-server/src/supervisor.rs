//! Process supervisor for a peer launched by the bridge.
//!
//! The peer is started with its output redirected to two log files. After
//! the session it is given time to exit on its own, and then stopped with
//! increasing force:
//!
//! ```text
//! wait exit_wait ─> request END ─> wait ─> SIGTERM ─> wait ─> SIGKILL ─> wait ─> give up
//! ```
//!
//! The order of steps lives in [`Escalation`]; this module only performs
//! them.

use std::{
    fs::File,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use cosim_core::{BridgeError, Escalation, EscalationAction, EscalationState, SupervisorConfig};
use tokio::process::{Child, Command};

use crate::{bridge::ShutdownHandle, error::SupervisorError};

/// Builds the peer command for the announced port.
pub trait PeerLauncher: Send + Sync {
    /// Command that starts the peer and makes it connect to `port`.
    fn command(&self, port: u16) -> Command;
}

impl<F> PeerLauncher for F
where
    F: Fn(u16) -> Command + Send + Sync,
{
    fn command(&self, port: u16) -> Command {
        self(port)
    }
}

/// A running peer process.
#[derive(Debug)]
pub struct PeerProcess {
    child: Child,
    pid: Option<u32>,
    stdout_log: PathBuf,
    stderr_log: PathBuf,
}

impl PeerProcess {
    /// Start the peer for `port`.
    ///
    /// Output goes to `<log_name>.stdout.log` and `<log_name>.stderr.log`.
    pub fn spawn(
        launcher: &dyn PeerLauncher,
        port: u16,
        log_name: &Path,
    ) -> Result<Self, SupervisorError> {
        let stdout_log = with_suffix(log_name, "stdout.log");
        let stderr_log = with_suffix(log_name, "stderr.log");
        let stdout = create_log(&stdout_log)?;
        let stderr = create_log(&stderr_log)?;

        let mut command = launcher.command(port);
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let child =
            command.spawn().map_err(|source| SupervisorError::Spawn { program: program.clone(), source })?;
        let pid = child.id();

        tracing::info!(program = %program, ?pid, port, "Launched peer process");
        Ok(Self { child, pid, stdout_log, stderr_log })
    }

    /// OS process id, if known.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Where the peer's standard output is written.
    pub fn stdout_log(&self) -> &Path {
        &self.stdout_log
    }

    /// Where the peer's standard error is written.
    pub fn stderr_log(&self) -> &Path {
        &self.stderr_log
    }

    /// Wait up to `wait` for the process to exit.
    ///
    /// Returns `Some(code)` once it has exited (`code` is `None` when it was
    /// ended by a signal), `None` if it is still running.
    async fn wait_exit(&mut self, wait: Duration) -> Option<Option<i32>> {
        match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => Some(status.code()),
            Ok(Err(e)) => {
                // Nothing left to wait on.
                tracing::warn!("Failed to wait for peer process: {}", e);
                Some(None)
            },
            Err(_) => None,
        }
    }

    /// Send the terminate signal.
    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use rustix::process::{Pid, Signal, kill_process};

            let Some(pid) =
                self.child.id().and_then(|id| i32::try_from(id).ok()).and_then(Pid::from_raw)
            else {
                tracing::debug!("Peer process already reaped, not sending SIGTERM");
                return;
            };
            if let Err(e) = kill_process(pid, Signal::TERM) {
                tracing::warn!("Failed to send SIGTERM to peer process: {}", e);
            }
        }

        #[cfg(not(unix))]
        self.kill();
    }

    /// Send the kill signal.
    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("Failed to kill peer process: {}", e);
        }
    }
}

/// How the peer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOutcome {
    /// OS process id, if known.
    pub pid: Option<u32>,
    /// Final escalation state.
    pub state: EscalationState,
    /// Escalation steps taken, in order.
    pub steps: Vec<EscalationAction>,
}

impl PeerOutcome {
    /// Exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            EscalationState::Exited(code) => code,
            _ => None,
        }
    }

    /// True if the peer exited on its own with code zero.
    pub fn succeeded(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Error to report if the peer could not be stopped at all.
    pub fn error(&self) -> Option<BridgeError> {
        (self.state == EscalationState::Unstoppable)
            .then_some(BridgeError::ProcessEscalation { pid: self.pid })
    }
}

/// Stops a launched peer once the session is over.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    /// Supervisor with the given waits.
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Wait for the peer to exit, escalating until it does or nothing is
    /// left to try.
    ///
    /// `shutdown` is used for the graceful step; it is a no-op if the
    /// session already ended.
    pub async fn reconcile(&self, peer: &mut PeerProcess, shutdown: &ShutdownHandle) -> PeerOutcome {
        let mut escalation = Escalation::new(self.config);
        let mut steps = Vec::new();
        let mut wait = escalation.initial_wait();

        while !escalation.is_finished() {
            if let Some(code) = peer.wait_exit(wait).await {
                escalation.on_exit(code);
                break;
            }

            let action = escalation.on_timeout();
            steps.push(action);
            match action {
                EscalationAction::RequestShutdown { wait: next } => {
                    tracing::warn!("Peer still running, requesting graceful shutdown");
                    shutdown.request();
                    wait = next;
                },
                EscalationAction::Terminate { wait: next } => {
                    tracing::warn!("Peer still running, sending SIGTERM");
                    peer.terminate();
                    wait = next;
                },
                EscalationAction::Kill { wait: next } => {
                    tracing::warn!("Peer still running, sending SIGKILL");
                    peer.kill();
                    wait = next;
                },
                EscalationAction::GiveUp => {
                    tracing::error!(pid = ?peer.id(), "Could not stop peer process");
                },
            }
        }

        let outcome = PeerOutcome { pid: peer.id(), state: escalation.state(), steps };
        match outcome.exit_code() {
            Some(0) => tracing::info!("Peer process exited cleanly"),
            Some(code) => tracing::warn!(code, "Peer process exited with failure"),
            None => tracing::warn!(state = ?outcome.state, "Peer process did not exit cleanly"),
        }
        outcome
    }
}

fn with_suffix(log_name: &Path, suffix: &str) -> PathBuf {
    let mut name = log_name.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn create_log(path: &Path) -> Result<File, SupervisorError> {
    File::create(path).map_err(|source| SupervisorError::LogFile { path: path.to_path_buf(), source })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn quick() -> SupervisorConfig {
        SupervisorConfig {
            exit_wait: Duration::from_millis(100),
            graceful_wait: Duration::from_millis(50),
            terminate_wait: Duration::from_millis(200),
            kill_wait: Duration::from_secs(2),
        }
    }

    fn detached_handle() -> ShutdownHandle {
        ShutdownHandle::detached()
    }

    fn shell(script: &'static str) -> impl Fn(u16) -> Command + Send + Sync {
        move |port| {
            let mut command = Command::new("sh");
            command.arg("-c").arg(script).env("COSIM_PORT", port.to_string());
            command
        }
    }

    #[tokio::test]
    async fn peer_output_goes_to_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("peer");
        let launcher = shell("echo port=$COSIM_PORT; echo oops >&2");

        let mut peer = PeerProcess::spawn(&launcher, 4242, &log).unwrap();
        let outcome = ProcessSupervisor::default().reconcile(&mut peer, &detached_handle()).await;

        assert!(outcome.succeeded());
        assert!(outcome.steps.is_empty());
        assert_eq!(std::fs::read_to_string(peer.stdout_log()).unwrap(), "port=4242\n");
        assert_eq!(std::fs::read_to_string(peer.stderr_log()).unwrap(), "oops\n");
        assert_eq!(peer.stdout_log(), dir.path().join("peer.stdout.log"));
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut peer = PeerProcess::spawn(&shell("exit 3"), 1, &dir.path().join("p")).unwrap();
        let outcome = ProcessSupervisor::default().reconcile(&mut peer, &detached_handle()).await;

        assert_eq!(outcome.exit_code(), Some(3));
        assert!(!outcome.succeeded());
        assert_eq!(outcome.error().map(|e| e.to_string()), None);
    }

    #[tokio::test]
    async fn lingering_peer_is_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let mut peer = PeerProcess::spawn(&shell("exec sleep 30"), 1, &dir.path().join("p")).unwrap();
        let outcome = ProcessSupervisor::new(quick()).reconcile(&mut peer, &detached_handle()).await;

        assert_eq!(
            outcome.steps,
            vec![
                EscalationAction::RequestShutdown { wait: Duration::from_millis(50) },
                EscalationAction::Terminate { wait: Duration::from_millis(200) },
            ]
        );
        // Ended by a signal: no exit code.
        assert_eq!(outcome.state, EscalationState::Exited(None));
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn peer_ignoring_sigterm_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = shell("trap '' TERM; while :; do sleep 0.05; done");
        let mut peer = PeerProcess::spawn(&launcher, 1, &dir.path().join("p")).unwrap();
        let outcome = ProcessSupervisor::new(quick()).reconcile(&mut peer, &detached_handle()).await;

        assert_eq!(outcome.steps.len(), 3);
        assert!(matches!(outcome.steps[2], EscalationAction::Kill { .. }));
        assert_eq!(outcome.state, EscalationState::Exited(None));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = |_port: u16| Command::new("/nonexistent/cosim-peer");
        let err = PeerProcess::spawn(&launcher, 1, &dir.path().join("p")).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }
}
