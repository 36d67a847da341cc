//! Command dispatcher.
//!
//! The `Session` owns the bridge's protocol state: the local clock, the
//! inactivity deadline and the signal registrations. It turns each inbound
//! [`Command`] into [`SessionAction`]s for the runtime to execute, strictly
//! one command at a time.
//!
//! ## Tick protocol
//!
//! ```text
//! handle_command(Tick) ──> [Advance]     runtime waits `delta` in the simulator
//! complete_tick(Some)  ──> [Send(TICK_COMPLETE)]
//! ```
//!
//! A tick that fails (`TimeRegression`) is still answered: the runtime calls
//! `complete_tick(None)` after reporting the error, so the peer is never left
//! waiting without feedback.

use std::{ops::Sub, time::Duration};

use cosim_proto::{Command, Outbound};

use crate::{
    clock::{Advance, ClockSync},
    config::{BridgeConfig, ClockUnit},
    error::BridgeError,
    liveness::Liveness,
    signals::SignalMap,
};

/// Actions returned by [`Session`] for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Run the local simulator forward, then call
    /// [`Session::complete_tick`].
    Advance(Advance),
    /// Send a message to the peer.
    Send(Outbound),
    /// Run the shutdown sequence.
    Shutdown {
        /// Why the session is ending.
        reason: String,
    },
}

/// Protocol state of one bridge session.
#[derive(Debug)]
pub struct Session<I> {
    clock: ClockSync,
    unit: ClockUnit,
    tick_timeout: Duration,
    liveness: Liveness<I>,
    signals: SignalMap,
    commands: u64,
}

impl<I> Session<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a session at local time zero.
    pub fn new(config: &BridgeConfig, signals: SignalMap) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            clock: ClockSync::new(&config.clock),
            unit: config.clock.unit,
            tick_timeout: config.tick_timeout,
            liveness: Liveness::new(config.inactivity_timeout),
            signals,
            commands: 0,
        })
    }

    /// Current local time; every outbound message is tagged with it.
    pub fn local_time(&self) -> u64 {
        self.clock.local()
    }

    /// Label of the local clock unit.
    pub fn clock_unit(&self) -> ClockUnit {
        self.unit
    }

    /// Whether a tick is being processed.
    pub fn tick_in_flight(&self) -> bool {
        self.clock.in_flight()
    }

    /// Maximum duration of one tick's advance.
    pub fn tick_timeout(&self) -> Duration {
        self.tick_timeout
    }

    /// Registered signals.
    pub fn signals(&self) -> &SignalMap {
        &self.signals
    }

    /// Number of commands dispatched so far.
    pub fn commands_handled(&self) -> u64 {
        self.commands
    }

    /// Dispatch one command received at `now`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Clock`] for a regressing or overflowing tick; the tick
    ///   stays in flight until [`complete_tick`](Self::complete_tick)
    /// - [`BridgeError::UnknownSignal`] / [`BridgeError::DriveApplication`]
    ///   for a failed drive
    /// - [`BridgeError::UnknownCommand`] for anything outside the grammar
    pub fn handle_command(
        &mut self,
        command: Command,
        now: I,
    ) -> Result<Vec<SessionAction>, BridgeError> {
        self.commands += 1;
        self.liveness.on_message(now);
        match command {
            Command::Tick(remote) => {
                let advance = self.clock.begin_tick(remote)?;
                Ok(vec![SessionAction::Advance(advance)])
            },
            Command::Drive { name, value } => {
                self.signals.drive(&name, &value)?;
                Ok(Vec::new())
            },
            Command::End => Ok(vec![SessionAction::Shutdown { reason: "peer sent END".into() }]),
            Command::Unknown(raw) => Err(BridgeError::UnknownCommand { raw }),
        }
    }

    /// Close the in-flight tick and answer it.
    ///
    /// `advance` is the completed advance, or `None` if the tick failed.
    pub fn complete_tick(&mut self, advance: Option<&Advance>) -> Vec<SessionAction> {
        if let Some(advance) = advance {
            self.clock.apply(advance);
        }
        self.clock.end_tick();
        vec![SessionAction::Send(Outbound::TickComplete)]
    }

    /// Verify the peer has not gone silent past the inactivity deadline.
    pub fn check_liveness(&self, now: I) -> Result<(), BridgeError> {
        self.liveness.check(now)
    }
}
