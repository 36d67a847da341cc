//! Sans-IO core of the co-simulation bridge.
//!
//! Every type here is a state machine or a seam trait. Nothing opens sockets,
//! spawns processes, or reads the wall clock directly; the runtime crate feeds
//! events in and executes the returned actions.
//!
//! ## Components
//!
//! ```text
//! Session ──┬─ ClockSync      (tick → local time advancement)
//!           ├─ Liveness       (hang / inactivity deadlines)
//!           └─ SignalMap      (drive inputs, enumerate outputs)
//!
//! ShutdownLatch               (Active → ShuttingDown → Closed)
//! Escalation                  (peer process stop sequence)
//! ```
//!
//! ## Seams
//!
//! - [`env::Environment`]: time and sleeping
//! - [`transport::Transport`]: accepting the peer's stream
//! - [`scheduler::Scheduler`]: the local simulator's notion of waiting
//! - [`signals::InputSignal`] / [`signals::OutputSignal`]: the local
//!   simulator's signals

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod env;
pub mod error;
pub mod escalation;
pub mod liveness;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod signals;
pub mod transport;

pub use clock::{Advance, AdvanceKind, ClockError, ClockSync};
pub use config::{BridgeConfig, ClockConfig, ClockUnit, ConfigError, SupervisorConfig};
pub use error::BridgeError;
pub use escalation::{Escalation, EscalationAction, EscalationState};
pub use liveness::Liveness;
pub use session::{Session, SessionAction};
pub use shutdown::{ShutdownLatch, ShutdownState};
pub use signals::{DriveError, InputSignal, OutputSignal, SignalError, SignalMap, Subscription, Wire};
