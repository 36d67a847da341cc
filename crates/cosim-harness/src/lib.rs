//! Deterministic simulation harness for co-simulation bridge testing.
//!
//! Turmoil-based implementations of the `Environment` and `Transport`
//! traits, a scripted peer, and schedulers standing in for the local
//! simulator. Every timeout in a session runs on virtual time, so a two
//! minute inactivity deadline costs nothing to test.
//!
//! # Example
//!
//! ```rust,ignore
//! use cosim_harness::{PeerStep, Scenario};
//!
//! let outcome = Scenario::new()
//!     .step(PeerStep::send("TICK:0;TICK:1;END;"))
//!     .run()
//!     .unwrap();
//! assert!(outcome.error.is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod peer;
pub mod scenario;
pub mod scheduler;
mod sim_env;
mod sim_transport;

pub use peer::{PeerError, SimPeer};
pub use scenario::{PeerStep, Scenario, ScenarioOutcome};
pub use scheduler::{RecordingScheduler, SleepScheduler, StalledScheduler, ToggleScheduler};
pub use sim_env::SimEnv;
pub use sim_transport::SimTransport;
