//! Co-simulation bridge runtime.
//!
//! This crate runs the sans-IO session from `cosim-core` against real I/O:
//! - Tokio TCP for the peer connection
//! - Tokio processes for launching and stopping the peer
//! - System time for every deadline
//!
//! ## Architecture
//!
//! ```text
//! cosim-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ TcpTransport       (listening socket, one peer)
//!   ├─ Connection         (framed reads, tagged writes)
//!   ├─ Bridge             (dispatch loop + shutdown coordinator)
//!   └─ ProcessSupervisor  (peer launch and stop escalation)
//! ```
//!
//! ## Run sequence
//!
//! ```text
//! bind ─> announce "COSIM SOCKET:<port>" ─> spawn peer ─> accept ─> run ─> reconcile peer
//! ```
//!
//! [`CosimServer::prepare`] exposes the session's [`ShutdownHandle`] before
//! it runs, for hosts that detect failures of their own.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod connection;
mod error;
mod supervisor;
mod system_env;
mod transport;

use std::{io::Write, path::PathBuf};

pub use bridge::{Bridge, SessionReport, ShutdownHandle, accept_peer};
pub use connection::Connection;
use cosim_core::{
    BridgeConfig, BridgeError, SignalMap, SupervisorConfig, scheduler::Scheduler,
    transport::Transport,
};
pub use error::{ServerError, SupervisorError};
pub use supervisor::{PeerLauncher, PeerOutcome, PeerProcess, ProcessSupervisor};
pub use system_env::SystemEnv;
pub use transport::TcpTransport;

/// Configuration for one bridge run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address to listen on. Port 0 picks an ephemeral port.
    pub bind_address: String,
    /// Session timeouts and clock.
    pub bridge: BridgeConfig,
    /// Peer stop sequence.
    pub supervisor: SupervisorConfig,
    /// Base name of the launched peer's log files.
    pub log_name: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            bridge: BridgeConfig::default(),
            supervisor: SupervisorConfig::default(),
            log_name: PathBuf::from("port_launch"),
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    /// Port the bridge listened on.
    pub port: u16,
    /// How the protocol session ended.
    pub session: SessionReport,
    /// How the launched peer ended, if one was launched.
    pub peer: Option<PeerOutcome>,
}

impl RunReport {
    /// The session completed without a fatal error and the launched peer,
    /// if any, exited with code zero.
    pub fn succeeded(&self) -> bool {
        self.session.succeeded() && self.peer.as_ref().is_none_or(PeerOutcome::succeeded)
    }
}

/// Bound but not yet connected bridge.
#[derive(Debug)]
pub struct CosimServer {
    transport: TcpTransport,
    config: RuntimeConfig,
    env: SystemEnv,
}

impl CosimServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns error if binding to the address fails.
    pub async fn bind(config: RuntimeConfig) -> Result<Self, ServerError> {
        let transport = TcpTransport::bind(&config.bind_address).await?;
        Ok(Self { transport, config, env: SystemEnv::new() })
    }

    /// Port the peer must connect to.
    pub fn port(&self) -> Result<u16, ServerError> {
        Ok(self.transport.local_port()?)
    }

    /// Write the port announcement line to `out`.
    pub fn announce(&self, out: &mut impl Write) -> Result<u16, ServerError> {
        let port = self.port()?;
        writeln!(out, "{}", cosim_proto::announce::announce_line(port))?;
        out.flush()?;
        Ok(port)
    }

    /// Build the session without starting it.
    ///
    /// The returned [`PreparedSession`] hands out the [`ShutdownHandle`]
    /// before anything runs, so a host-side failure detector can end the
    /// session at any point.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn prepare(
        self,
        signals: SignalMap,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<PreparedSession, ServerError> {
        let bridge = Bridge::new(self.env, self.config.bridge.clone(), signals, scheduler)?;
        Ok(PreparedSession { server: self, bridge })
    }

    /// Prepare and run in one step. See [`PreparedSession::run`].
    ///
    /// # Errors
    ///
    /// See [`CosimServer::prepare`] and [`PreparedSession::run`].
    pub async fn run(
        self,
        signals: SignalMap,
        scheduler: Box<dyn Scheduler>,
        launcher: Option<&dyn PeerLauncher>,
    ) -> Result<RunReport, ServerError> {
        self.prepare(signals, scheduler)?.run(launcher).await
    }
}

/// Bound server with its session built but not yet running.
pub struct PreparedSession {
    server: CosimServer,
    bridge: Bridge<SystemEnv>,
}

impl PreparedSession {
    /// Handle for ending the session from outside.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.bridge.shutdown_handle()
    }

    /// Launch the peer (if a launcher is given), serve one session and
    /// reconcile the peer's exit.
    ///
    /// # Errors
    ///
    /// Returns error if the peer cannot be launched. Failures during the
    /// session are reported in the [`RunReport`].
    pub async fn run(self, launcher: Option<&dyn PeerLauncher>) -> Result<RunReport, ServerError> {
        let Self { server, bridge } = self;
        let port = server.port()?;
        let handle = bridge.shutdown_handle();

        let mut peer = launcher
            .map(|launcher| PeerProcess::spawn(launcher, port, &server.config.log_name))
            .transpose()?;

        let connect_timeout = server.config.bridge.connect_timeout;
        let accepted = tokio::select! {
            accepted = accept_peer(&server.env, &server.transport, connect_timeout) => accepted,
            () = handle.requested() => Err(BridgeError::Aborted {
                reason: "shutdown requested before the peer connected".to_string(),
            }),
        };
        let session = match accepted {
            Ok(stream) => match tokio::spawn(bridge.run(stream)).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Bridge session task failed: {}", e);
                    handle.request();
                    SessionReport::failed(BridgeError::Aborted { reason: e.to_string() })
                },
            },
            Err(e) => bridge.abandon(e),
        };

        let peer = match peer.as_mut() {
            Some(process) => {
                let supervisor = ProcessSupervisor::new(server.config.supervisor);
                let outcome = supervisor.reconcile(process, &handle).await;
                if let Some(e) = outcome.error() {
                    tracing::error!("ERROR: {}", e);
                }
                Some(outcome)
            },
            None => None,
        };

        let report = RunReport { port, session, peer };
        if report.succeeded() {
            tracing::info!("Co-simulation run succeeded");
        } else {
            tracing::warn!("Co-simulation run failed");
        }
        Ok(report)
    }
}

/// Bind, announce the port on standard output and run one session.
///
/// An interrupt (Ctrl-C) ends the session through its [`ShutdownHandle`], so
/// the peer still receives END and goes through the stop sequence. Hosts with
/// their own failure detection use [`CosimServer::prepare`] instead.
///
/// # Errors
///
/// See [`CosimServer::bind`] and [`CosimServer::run`].
pub async fn launch_on_port(
    config: RuntimeConfig,
    signals: SignalMap,
    scheduler: Box<dyn Scheduler>,
    launcher: Option<&dyn PeerLauncher>,
) -> Result<RunReport, ServerError> {
    let server = CosimServer::bind(config).await?;
    server.announce(&mut std::io::stdout().lock())?;
    let prepared = server.prepare(signals, scheduler)?;

    let handle = prepared.shutdown_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted");
            handle.request();
        }
    });

    let report = prepared.run(launcher).await;
    interrupt.abort();
    report
}
