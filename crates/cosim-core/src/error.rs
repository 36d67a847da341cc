//! Bridge error taxonomy.

use std::time::Duration;

use cosim_proto::ProtoError;
use thiserror::Error;

use crate::{clock::ClockError, config::ConfigError, signals::DriveError};

/// Errors that end (or would end) a bridge session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The peer never connected.
    #[error("socket connection timed out after {after:?}")]
    ConnectTimeout {
        /// Configured connect timeout.
        after: Duration,
    },

    /// Reading from or writing to the peer failed.
    #[error("communication with peer failed: {reason}")]
    Communication {
        /// Underlying failure.
        reason: String,
    },

    /// The inbound byte stream could not be framed.
    #[error("protocol error: {0}")]
    Framing(#[from] ProtoError),

    /// A message outside the command grammar.
    #[error("unknown message received: {raw:?}")]
    UnknownCommand {
        /// The message as framed.
        raw: String,
    },

    /// `DRIVE` for a name that is not a registered input.
    #[error("signal {name:?} not set up for driving")]
    UnknownSignal {
        /// Requested signal name.
        name: String,
    },

    /// The local simulator refused a drive.
    #[error("failed to write {name}: {source}")]
    DriveApplication {
        /// Signal being driven.
        name: String,
        /// Reason given by the signal.
        source: DriveError,
    },

    /// A tick's advance did not complete in the local simulator.
    #[error("timed out after {after:?} waiting for tick to complete in the local simulator")]
    HangTimeout {
        /// Configured tick timeout.
        after: Duration,
    },

    /// The peer went silent.
    #[error(
        "no message from peer for {after:?}; it may have hung or died without shutting down \
         the connection"
    )]
    InactivityTimeout {
        /// Configured inactivity timeout.
        after: Duration,
    },

    /// Non-monotonic or unrepresentable tick request.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The session task died without producing a result.
    #[error("bridge session aborted: {reason}")]
    Aborted {
        /// Panic or cancellation message.
        reason: String,
    },

    /// The launched peer survived the whole stop sequence.
    #[error("peer process {pid:?} could not be stopped")]
    ProcessEscalation {
        /// OS process id, if it was known.
        pid: Option<u32>,
    },
}

impl BridgeError {
    /// Returns true if this error ends the session.
    ///
    /// Every session-level error is fatal today, protocol violations
    /// included. Only escalation failure is reported without being thrown
    /// further, since the session is already over when it happens.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ProcessEscalation { .. })
    }

    /// Returns true if the peer violated the protocol (as opposed to timing
    /// out or the transport failing).
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Framing(_)
                | Self::UnknownCommand { .. }
                | Self::UnknownSignal { .. }
                | Self::DriveApplication { .. }
                | Self::Clock(ClockError::Regression { .. })
        )
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Communication { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_failure_is_not_fatal() {
        assert!(!BridgeError::ProcessEscalation { pid: Some(1) }.is_fatal());
        assert!(BridgeError::HangTimeout { after: Duration::from_secs(5) }.is_fatal());
        assert!(BridgeError::UnknownSignal { name: "a".into() }.is_fatal());
    }

    #[test]
    fn protocol_classification() {
        assert!(BridgeError::UnknownCommand { raw: "HELLO".into() }.is_protocol());
        assert!(
            BridgeError::Clock(ClockError::Regression { local: 2, remote: 0, ratio: 1 })
                .is_protocol()
        );
        assert!(!BridgeError::ConnectTimeout { after: Duration::from_secs(1) }.is_protocol());
        assert!(!BridgeError::Communication { reason: "reset".into() }.is_protocol());
    }

    #[test]
    fn error_display() {
        let err = BridgeError::UnknownSignal { name: "apple".into() };
        assert_eq!(err.to_string(), "signal \"apple\" not set up for driving");

        let err = BridgeError::Clock(ClockError::Overflow { remote: 9 });
        assert_eq!(err.to_string(), "tick 9 overflows the local clock");
    }
}
