//! Outbound messages and the time-tagged envelope.

use std::fmt;

use crate::error::ProtoError;

/// A message sent by the bridge to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// `UPDATE:<name>=<value>`: an observed output changed (or its initial
    /// snapshot).
    Update {
        /// Registered output signal name.
        name: String,
        /// Serialized value as reported by the local simulator.
        value: String,
    },

    /// `TICK_COMPLETE`: the requested tick has been processed.
    TickComplete,

    /// `END`: the bridge is shutting down.
    End,
}

impl Outbound {
    /// Parse a message body (the part after the `@<time>:` tag).
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::UnknownOutbound`] for anything outside the grammar.
    pub fn parse(body: &str) -> Result<Self, ProtoError> {
        match body {
            "TICK_COMPLETE" => Ok(Self::TickComplete),
            "END" => Ok(Self::End),
            _ => body
                .strip_prefix("UPDATE:")
                .and_then(|update| update.split_once('='))
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| Self::Update { name: name.to_owned(), value: value.to_owned() })
                .ok_or_else(|| ProtoError::UnknownOutbound(body.to_owned())),
        }
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update { name, value } => write!(f, "UPDATE:{name}={value}"),
            Self::TickComplete => f.write_str("TICK_COMPLETE"),
            Self::End => f.write_str("END"),
        }
    }
}

/// An outbound message tagged with the bridge's local time at send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Local clock value when the message was sent.
    pub time: u64,
    /// Message body.
    pub body: Outbound,
}

impl Envelope {
    /// Tag `body` with `time`.
    pub const fn new(time: u64, body: Outbound) -> Self {
        Self { time, body }
    }

    /// Encode as `@<time>:<body>\n`.
    pub fn encode(&self) -> String {
        format!("@{}:{}\n", self.time, self.body)
    }

    /// Decode one line (with or without its terminator).
    ///
    /// This is the peer's side of the protocol; the bridge never reads
    /// envelopes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::MalformedEnvelope`] if the `@<time>:` tag is
    /// missing or not an integer, and [`ProtoError::UnknownOutbound`] if the
    /// body does not parse.
    pub fn parse(line: &str) -> Result<Self, ProtoError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (time, body) = line
            .strip_prefix('@')
            .and_then(|rest| rest.split_once(':'))
            .ok_or_else(|| ProtoError::MalformedEnvelope(line.to_owned()))?;
        let time = time.parse().map_err(|_| ProtoError::MalformedEnvelope(line.to_owned()))?;
        Ok(Self { time, body: Outbound::parse(body)? })
    }
}
