//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the bridge's timeouts from the wall
//! clock:
//!
//! - Deterministic Simulation: Turmoil drives a virtual clock, so hang and
//!   inactivity timeouts of minutes run instantly and reproducibly.
//!
//! - Production Runtime: Tokio uses real system time without any change to
//!   the dispatch logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Isolation: Implementations must not share global state

use std::{fmt::Debug, ops::Sub, time::Duration};

/// Abstract environment providing time and sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Point in time, real or virtual.
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>;

    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: This method MUST return values that never decrease
    ///   within a single execution context.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only runtime code awaits this. State machines take `now` as a
    /// parameter instead.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
