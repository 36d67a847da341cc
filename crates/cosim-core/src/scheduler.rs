//! The local simulator's notion of waiting.
//!
//! A jump of `delta` local units is not instantaneous: the local simulator
//! has to run that much simulated time, during which its outputs may change.
//! [`Scheduler::advance`] is that suspension.

use async_trait::async_trait;

use crate::config::ClockUnit;

/// Runs the local simulator forward.
#[async_trait]
pub trait Scheduler: Send {
    /// Let `delta` local units (of `unit`) elapse in the local simulator.
    ///
    /// Called with `delta == 0` for the no-op boundary tick.
    async fn advance(&mut self, delta: u64, unit: ClockUnit);
}

/// A simulator with nothing to simulate: every advance completes at once.
///
/// Still yields to the runtime so output observers run before the tick is
/// answered.
#[derive(Debug, Default, Clone)]
pub struct ImmediateScheduler {
    elapsed: u64,
    advances: usize,
}

impl ImmediateScheduler {
    /// Scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total local units advanced so far.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Number of advances requested.
    pub fn advances(&self) -> usize {
        self.advances
    }
}

#[async_trait]
impl Scheduler for ImmediateScheduler {
    async fn advance(&mut self, delta: u64, _unit: ClockUnit) {
        self.elapsed = self.elapsed.saturating_add(delta);
        self.advances += 1;
        tokio::task::yield_now().await;
    }
}
