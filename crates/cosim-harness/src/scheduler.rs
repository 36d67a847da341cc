//! Stand-ins for the local simulator.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use cosim_core::{ClockUnit, Wire, scheduler::Scheduler};

/// Takes `per_unit` of virtual time per local unit advanced.
#[derive(Debug, Clone, Copy)]
pub struct SleepScheduler {
    per_unit: Duration,
}

impl SleepScheduler {
    /// Scheduler costing `per_unit` per local unit.
    pub fn new(per_unit: Duration) -> Self {
        Self { per_unit }
    }
}

#[async_trait]
impl Scheduler for SleepScheduler {
    async fn advance(&mut self, delta: u64, _unit: ClockUnit) {
        let units = u32::try_from(delta).unwrap_or(u32::MAX);
        tokio::time::sleep(self.per_unit.saturating_mul(units)).await;
    }
}

/// Never completes an advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalledScheduler;

#[async_trait]
impl Scheduler for StalledScheduler {
    async fn advance(&mut self, _delta: u64, _unit: ClockUnit) {
        std::future::pending::<()>().await;
    }
}

/// Completes at once and records every requested delta.
#[derive(Debug, Clone, Default)]
pub struct RecordingScheduler {
    deltas: Arc<Mutex<Vec<u64>>>,
}

impl RecordingScheduler {
    /// Empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deltas requested so far, shared with every clone.
    pub fn deltas(&self) -> Vec<u64> {
        self.deltas.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn advance(&mut self, delta: u64, _unit: ClockUnit) {
        if let Ok(mut deltas) = self.deltas.lock() {
            deltas.push(delta);
        }
        tokio::task::yield_now().await;
    }
}

/// Flips a one-bit wire at the end of every non-empty advance, like a clock
/// generator in the local design.
#[derive(Debug, Clone)]
pub struct ToggleScheduler {
    wire: Wire,
}

impl ToggleScheduler {
    /// Toggle `wire` between `0` and `1`.
    pub fn new(wire: Wire) -> Self {
        Self { wire }
    }
}

#[async_trait]
impl Scheduler for ToggleScheduler {
    async fn advance(&mut self, delta: u64, _unit: ClockUnit) {
        if delta == 0 {
            return;
        }
        let next = if self.wire.get() == "1" { "0" } else { "1" };
        self.wire.set(next);
        tokio::task::yield_now().await;
    }
}
