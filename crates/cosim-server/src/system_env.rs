//! Production Environment implementation using system time.
//!
//! This module provides `SystemEnv`, the production implementation of the
//! `Environment` trait backed by the OS monotonic clock and Tokio timers.

use std::time::{Duration, Instant};

use cosim_core::env::Environment;

/// Production environment using system time.
///
/// This implementation:
/// - Uses `std::time::Instant::now()` for time
/// - Uses `tokio::time::sleep()` for async sleeping
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
