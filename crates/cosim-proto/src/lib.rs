//! Co-simulation wire protocol.
//!
//! Text messages exchanged between the bridge and its peer simulator over a
//! stream socket. Everything in this crate is pure: no sockets, no clocks.
//!
//! # Wire format
//!
//! ```text
//! peer -> bridge   TICK:<remote time>;  DRIVE:<name>:<value>;  END;
//! bridge -> peer   @<local time>:UPDATE:<name>=<value>\n
//!                  @<local time>:TICK_COMPLETE\n
//!                  @<local time>:END\n
//! ```
//!
//! Inbound messages are separated by `;` or a newline and may be split
//! arbitrarily across socket reads; [`Framer`] reassembles them.
//!
//! # Components
//!
//! - [`Framer`]: byte stream to discrete messages
//! - [`Command`]: inbound message grammar
//! - [`Envelope`] / [`Outbound`]: time-tagged outbound messages
//! - [`announce`]: the port discovery line printed before accepting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod announce;
mod command;
mod envelope;
mod error;
mod framer;

pub use command::Command;
pub use envelope::{Envelope, Outbound};
pub use error::ProtoError;
pub use framer::{Framer, MAX_PENDING_BYTES, is_separator};
