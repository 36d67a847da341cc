//! Bridge and supervisor configuration.
//!
//! Defaults follow the connector this bridge replaces: 5 s poll and tick
//! timeouts, 1000 local units per remote tick in picoseconds, a 1 s grace
//! after sending `END`, and a 2 s / 2 s / 1 s / 1 s stop sequence for a
//! launched peer.

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

/// Connect and inactivity timeout used when the bridge launches its own peer.
pub const LAUNCHED_PEER_TIMEOUT: Duration = Duration::from_secs(120);

/// Label for the local clock's unit.
///
/// Purely descriptive: the clock arithmetic is unit-free. Schedulers may use
/// it to convert a delta into their own time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockUnit {
    /// Femtoseconds
    Fs,
    /// Picoseconds
    #[default]
    Ps,
    /// Nanoseconds
    Ns,
    /// Microseconds
    Us,
    /// Milliseconds
    Ms,
    /// Seconds
    S,
    /// The local simulator's smallest time step
    Step,
}

impl ClockUnit {
    /// Wire/CLI spelling of this unit.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Ps => "ps",
            Self::Ns => "ns",
            Self::Us => "us",
            Self::Ms => "ms",
            Self::S => "s",
            Self::Step => "step",
        }
    }
}

impl fmt::Display for ClockUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClockUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(Self::Fs),
            "ps" => Ok(Self::Ps),
            "ns" => Ok(Self::Ns),
            "us" => Ok(Self::Us),
            "ms" => Ok(Self::Ms),
            "s" => Ok(Self::S),
            "step" => Ok(Self::Step),
            other => Err(ConfigError::UnknownClockUnit(other.to_owned())),
        }
    }
}

/// Relationship between the local and the remote clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Local time units per remote tick.
    pub ratio: u64,
    /// Label for the local unit.
    pub unit: ClockUnit,
    /// Local units advanced for a repeated tick within one coarse timestamp.
    pub min_step: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { ratio: 1000, unit: ClockUnit::Ps, min_step: 1 }
    }
}

/// Session timeouts and clock settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Maximum wait per poll cycle before liveness is re-checked.
    pub listen_timeout: Duration,
    /// Maximum wait for the peer to connect. `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Maximum time a tick's advance may take in the local simulator.
    pub tick_timeout: Duration,
    /// Maximum gap between inbound messages once the first has arrived.
    /// `None` disables the check.
    pub inactivity_timeout: Option<Duration>,
    /// Pause after sending `END` before the connection is closed.
    pub shutdown_grace: Duration,
    /// Clock ratio and step.
    pub clock: ClockConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(5),
            connect_timeout: None,
            tick_timeout: Duration::from_secs(5),
            inactivity_timeout: None,
            shutdown_grace: Duration::from_secs(1),
            clock: ClockConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Defaults for a session whose peer is launched by the bridge itself.
    ///
    /// A launched peer that never connects, or goes silent, is treated as
    /// hung after [`LAUNCHED_PEER_TIMEOUT`].
    pub fn launching() -> Self {
        Self {
            connect_timeout: Some(LAUNCHED_PEER_TIMEOUT),
            inactivity_timeout: Some(LAUNCHED_PEER_TIMEOUT),
            ..Self::default()
        }
    }

    /// Check that the configuration can drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock.ratio == 0 {
            return Err(ConfigError::ZeroRatio);
        }
        if self.clock.min_step == 0 {
            return Err(ConfigError::ZeroMinStep);
        }
        for (field, value) in [
            ("listen_timeout", Some(self.listen_timeout)),
            ("tick_timeout", Some(self.tick_timeout)),
            ("connect_timeout", self.connect_timeout),
            ("inactivity_timeout", self.inactivity_timeout),
        ] {
            if value == Some(Duration::ZERO) {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }
        Ok(())
    }
}

/// Wait intervals for stopping a launched peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Wait for a natural exit after the session ends.
    pub exit_wait: Duration,
    /// Wait after requesting a graceful shutdown over the protocol.
    pub graceful_wait: Duration,
    /// Wait after the terminate signal.
    pub terminate_wait: Duration,
    /// Wait after the kill signal.
    pub kill_wait: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            exit_wait: Duration::from_secs(2),
            graceful_wait: Duration::from_secs(2),
            terminate_wait: Duration::from_secs(1),
            kill_wait: Duration::from_secs(1),
        }
    }
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Clock ratio of zero.
    #[error("clock ratio must be at least 1")]
    ZeroRatio,

    /// Minimal step of zero would stall repeated ticks.
    #[error("minimal time step must be at least 1")]
    ZeroMinStep,

    /// A timeout of zero would fire immediately.
    #[error("{field} must be non-zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },

    /// Unrecognized clock unit label.
    #[error("unknown clock unit {0:?} (expected fs, ps, ns, us, ms, s or step)")]
    UnknownClockUnit(String),
}
