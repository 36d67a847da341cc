//! Virtual-time environment for simulations.

use std::time::Duration;

use cosim_core::env::Environment;

/// Environment on Turmoil's virtual clock.
///
/// Turmoil drives Tokio's timer, so `tokio::time::Instant` and
/// `tokio::time::sleep` both observe simulated time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEnv;

impl SimEnv {
    /// Create a simulated environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> tokio::time::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
