//! Bridge runtime: executes [`Session`] actions against a real connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  bytes   ┌────────────┐ Command ┌─────────┐
//! │  Connection  │ ───────> │   Bridge   │ ──────> │ Session │
//! │ (framed I/O) │ <─────── │ (this file)│ <────── │ (sans-IO)│
//! └──────────────┘ @t:body  └─────┬──────┘ actions └─────────┘
//!                                 │ advance(delta)
//!                           ┌─────▼──────┐
//!                           │ Scheduler  │  local simulator
//!                           └────────────┘
//! ```
//!
//! Commands are dispatched strictly in arrival order; a tick's advance is
//! awaited before the next command is looked at. Output observers run as
//! separate tasks and feed a channel the loop drains between commands and
//! before every `TICK_COMPLETE`.

use std::sync::Arc;

use cosim_core::{
    Advance, BridgeConfig, BridgeError, Session, SessionAction, ShutdownLatch, ShutdownState,
    SignalMap, env::Environment, scheduler::Scheduler, transport::Transport,
};
use cosim_proto::{Command, Outbound};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Notify, mpsc},
    task::JoinSet,
};

use crate::connection::Connection;

/// Value change observed on an output signal.
type Update = (String, String);

/// Result of one bridge session.
#[derive(Debug)]
pub struct SessionReport {
    /// Local clock when the session ended.
    pub local_time: u64,
    /// Commands dispatched.
    pub commands: u64,
    /// First fatal error, if any.
    pub error: Option<BridgeError>,
}

impl SessionReport {
    /// Report for a session that failed before it could run.
    pub fn failed(error: BridgeError) -> Self {
        Self { local_time: 0, commands: 0, error: Some(error) }
    }

    /// True if the session ended without a fatal error.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Requests shutdown of a running bridge from outside its task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    latch: Arc<ShutdownLatch>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Ask the bridge to run its shutdown sequence. No-op once shutdown has
    /// begun.
    pub fn request(&self) {
        if self.latch.is_active() {
            self.notify.notify_one();
        }
    }

    /// Resolves once a request has been made.
    ///
    /// Consumes the request, so only callers that take over the shutdown
    /// themselves may wait on it.
    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }

    /// Handle attached to no bridge.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { latch: Arc::new(ShutdownLatch::new()), notify: Arc::new(Notify::new()) }
    }

    /// Current shutdown state of the bridge.
    pub fn state(&self) -> ShutdownState {
        self.latch.state()
    }
}

/// Wait for the peer to connect.
///
/// With `timeout` set, fails with [`BridgeError::ConnectTimeout`] once it
/// elapses. Without one, waits indefinitely.
pub async fn accept_peer<E, T>(
    env: &E,
    transport: &T,
    timeout: Option<std::time::Duration>,
) -> Result<T::Stream, BridgeError>
where
    E: Environment,
    T: Transport,
{
    tracing::info!("Waiting for socket connection");

    let stream = match timeout {
        None => transport.accept().await?,
        Some(after) => tokio::select! {
            accepted = transport.accept() => accepted?,
            () = env.sleep(after) => return Err(BridgeError::ConnectTimeout { after }),
        },
    };

    tracing::info!("Socket is connected");
    Ok(stream)
}

/// One bridge session over one peer connection.
pub struct Bridge<E: Environment> {
    env: E,
    config: BridgeConfig,
    session: Session<E::Instant>,
    scheduler: Box<dyn Scheduler>,
    latch: Arc<ShutdownLatch>,
    notify: Arc<Notify>,
    error: Option<BridgeError>,
}

impl<E: Environment> Bridge<E> {
    /// Create a bridge. Fails if `config` is invalid.
    pub fn new(
        env: E,
        config: BridgeConfig,
        signals: SignalMap,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<Self, BridgeError> {
        let session = Session::new(&config, signals)?;
        Ok(Self {
            env,
            config,
            session,
            scheduler,
            latch: Arc::new(ShutdownLatch::new()),
            notify: Arc::new(Notify::new()),
            error: None,
        })
    }

    /// Handle for requesting shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { latch: Arc::clone(&self.latch), notify: Arc::clone(&self.notify) }
    }

    /// End a session that never got a connection.
    pub fn abandon(self, error: BridgeError) -> SessionReport {
        tracing::error!("ERROR: {}", error);
        self.latch.close();
        SessionReport::failed(error)
    }

    /// Run the session until END, a fatal error or an external shutdown
    /// request.
    pub async fn run<S>(mut self, stream: S) -> SessionReport
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut conn = Connection::new(stream);
        let (update_tx, mut updates) = mpsc::unbounded_channel::<Update>();
        let mut observers = JoinSet::new();

        let subscriptions: Vec<_> = self
            .session
            .signals()
            .outputs()
            .map(|(name, signal)| (name.to_owned(), signal.subscribe()))
            .collect();

        for (name, mut subscription) in subscriptions {
            let value = subscription.current();
            self.emit(&mut conn, Outbound::Update { name: name.clone(), value }).await;

            let tx = update_tx.clone();
            observers.spawn(async move {
                while let Some(value) = subscription.changed().await {
                    if tx.send((name.clone(), value)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(update_tx);

        // Liveness is polled on a fixed cadence; traffic in either direction
        // does not push the next check back.
        let env = self.env.clone();
        let poll_interval = self.config.listen_timeout;
        let poll = env.sleep(poll_interval);
        tokio::pin!(poll);

        while self.latch.is_active() {
            tokio::select! {
                biased;

                () = self.notify.notified() => {
                    self.shutdown(&mut conn, "shutdown requested").await;
                }

                Some((name, value)) = updates.recv() => {
                    self.emit(&mut conn, Outbound::Update { name, value }).await;
                }

                read = conn.read() => match read {
                    Ok(Some(messages)) => self.dispatch(&mut conn, messages, &mut updates).await,
                    Ok(None) => {
                        let reason = "peer closed the connection without END".to_string();
                        self.fail(&mut conn, BridgeError::Communication { reason }).await;
                    },
                    Err(e) => self.fail(&mut conn, e).await,
                },

                () = &mut poll => {
                    poll.set(env.sleep(poll_interval));
                    if let Err(e) = self.session.check_liveness(self.env.now()) {
                        self.fail(&mut conn, e).await;
                    }
                }
            }
        }

        observers.abort_all();
        // Shutdown may have begun elsewhere; make sure the stream is released.
        self.shutdown(&mut conn, "session ended").await;

        let (bytes_in, bytes_out) = conn.byte_counts();
        tracing::info!(
            local_time = self.session.local_time(),
            commands = self.session.commands_handled(),
            bytes_in,
            bytes_out,
            "Bridge session finished"
        );

        SessionReport {
            local_time: self.session.local_time(),
            commands: self.session.commands_handled(),
            error: self.error,
        }
    }

    /// Dispatch a batch of messages in order.
    ///
    /// Stops at the first command that ends the session; the shutdown flag
    /// is only rechecked between commands.
    async fn dispatch<S>(
        &mut self,
        conn: &mut Connection<S>,
        messages: Vec<String>,
        updates: &mut mpsc::UnboundedReceiver<Update>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        for message in messages {
            if !self.latch.is_active() {
                tracing::debug!(%message, "Dropping message received during shutdown");
                break;
            }
            let command = Command::parse(&message);
            tracing::debug!(%message, kind = command.kind(), "Received");

            match self.session.handle_command(command, self.env.now()) {
                Ok(actions) => self.execute(conn, actions, updates).await,
                Err(e) => {
                    if self.session.tick_in_flight() {
                        // Answer the failed tick before reporting.
                        self.finish_tick(conn, None, updates).await;
                    }
                    self.fail(conn, e).await;
                },
            }
        }
    }

    async fn execute<S>(
        &mut self,
        conn: &mut Connection<S>,
        actions: Vec<SessionAction>,
        updates: &mut mpsc::UnboundedReceiver<Update>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        for action in actions {
            match action {
                SessionAction::Advance(advance) => match self.advance(&advance).await {
                    Ok(()) => self.finish_tick(conn, Some(&advance), updates).await,
                    Err(e) => {
                        self.finish_tick(conn, None, updates).await;
                        self.fail(conn, e).await;
                    },
                },
                SessionAction::Send(body) => self.emit(conn, body).await,
                SessionAction::Shutdown { reason } => self.shutdown(conn, &reason).await,
            }
        }
    }

    /// Run the local simulator for one tick, bounded by the tick timeout.
    async fn advance(&mut self, advance: &Advance) -> Result<(), BridgeError> {
        let after = self.session.tick_timeout();
        tracing::debug!(
            remote = advance.remote,
            kind = ?advance.kind,
            delta = advance.delta,
            target = advance.target,
            "Advancing local simulator"
        );

        tokio::select! {
            () = self.scheduler.advance(advance.delta, self.session.clock_unit()) => Ok(()),
            () = self.env.sleep(after) => Err(BridgeError::HangTimeout { after }),
        }
    }

    /// Flush observed updates, then answer the tick.
    async fn finish_tick<S>(
        &mut self,
        conn: &mut Connection<S>,
        advance: Option<&Advance>,
        updates: &mut mpsc::UnboundedReceiver<Update>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // Let observers woken during the advance publish first. Only changes
        // the scheduler made before `advance` returned are covered; anything
        // published later goes out after TICK_COMPLETE.
        tokio::task::yield_now().await;

        if let Some(advance) = advance {
            // Updates flushed here carry the post-tick time.
            let actions = self.session.complete_tick(Some(advance));
            while let Ok((name, value)) = updates.try_recv() {
                self.emit(conn, Outbound::Update { name, value }).await;
            }
            for action in actions {
                if let SessionAction::Send(body) = action {
                    self.emit(conn, body).await;
                }
            }
        } else {
            for action in self.session.complete_tick(None) {
                if let SessionAction::Send(body) = action {
                    self.emit(conn, body).await;
                }
            }
        }
    }

    /// Send a message tagged with the current local time. A failed send is
    /// fatal.
    async fn emit<S>(&mut self, conn: &mut Connection<S>, body: Outbound)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if !conn.is_open() {
            tracing::debug!(%body, "Connection closed, not sending");
            return;
        }

        let time = self.session.local_time();
        tracing::debug!(time, %body, "Sending");
        if let Err(e) = conn.send(time, &body).await {
            self.fail(conn, e).await;
        }
    }

    /// Record a fatal error and shut down.
    async fn fail<S>(&mut self, conn: &mut Connection<S>, error: BridgeError)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        tracing::error!("ERROR: {}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.shutdown(conn, "error").await;
    }

    /// Notify the peer and close the connection, at most once.
    async fn shutdown<S>(&mut self, conn: &mut Connection<S>, reason: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if self.latch.begin() {
            tracing::info!(reason, "Shutting down co-simulation socket");

            let time = self.session.local_time();
            if let Err(e) = conn.send(time, &Outbound::End).await {
                tracing::debug!("Could not send END: {}", e);
            }
            // Give the peer time to read END before the socket goes away.
            self.env.sleep(self.config.shutdown_grace).await;
        }

        if conn.close().await {
            tracing::debug!("Co-simulation socket closed");
        }
        self.latch.close();
    }
}
