//! Time synchronizer.
//!
//! Reconciles the peer's coarse clock with the local simulator's fine clock.
//! One remote tick spans `ratio` local units. The peer asks for ticks; the
//! bridge decides how far the local simulator must run before answering.
//!
//! ```text
//! remote:   0         1         2
//!           |---------|---------|
//! local:    0       1000      2000
//!                     ^ ^ ^
//!                     | | repeated TICK:1 → Step (min_step)
//!                     | repeated TICK:1 → Step (min_step)
//!                     TICK:1 → Jump (to 1000)
//! ```
//!
//! # Invariants
//!
//! - Monotonicity: the local clock never decreases
//! - Regression: a tick at or before a coarse timestamp already passed is
//!   rejected without touching the clock
//! - At most one tick is in flight at a time

use thiserror::Error;

use crate::config::ClockConfig;

/// How a tick advances the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceKind {
    /// Repeated tick within an already-reached coarse timestamp: advance by
    /// the configured minimal step to order sub-tick events.
    Step,
    /// First tick for a new coarse timestamp: run the full delta.
    Jump,
}

/// The advance a tick requires. The runtime waits `delta` local units in
/// the local simulator and then applies the advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Remote time that was requested.
    pub remote: u64,
    /// Step or jump.
    pub kind: AdvanceKind,
    /// Local units to wait. Zero for the no-op boundary tick.
    pub delta: u64,
    /// Local clock value once the wait completes.
    pub target: u64,
}

/// Tick requests that cannot be honored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// The requested remote time is already behind the local clock.
    #[error(
        "time regression: tick {remote} requested at local time {local} (ratio {ratio}); \
         too many ticks or time incorrect"
    )]
    Regression {
        /// Local clock when the tick arrived.
        local: u64,
        /// Requested remote time.
        remote: u64,
        /// Configured ratio.
        ratio: u64,
    },

    /// The requested remote time does not fit the local clock's range.
    #[error("tick {remote} overflows the local clock")]
    Overflow {
        /// Requested remote time.
        remote: u64,
    },
}

/// Local clock state machine driven by `TICK` requests.
#[derive(Debug, Clone)]
pub struct ClockSync {
    local: u64,
    ratio: u64,
    min_step: u64,
    /// Remote time of the last completed tick; `None` until the first.
    last_remote: Option<u64>,
    in_flight: bool,
}

impl ClockSync {
    /// Clock at local time zero.
    ///
    /// `config` must have been validated (non-zero ratio and step).
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            local: 0,
            ratio: config.ratio.max(1),
            min_step: config.min_step.max(1),
            last_remote: None,
            in_flight: false,
        }
    }

    /// Current local time.
    pub fn local(&self) -> u64 {
        self.local
    }

    /// Local units per remote tick.
    pub fn ratio(&self) -> u64 {
        self.ratio
    }

    /// True between [`begin_tick`](Self::begin_tick) and
    /// [`end_tick`](Self::end_tick).
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Start processing a tick for `remote` and compute the advance.
    ///
    /// Marks the tick in flight even when it fails; the caller always closes
    /// it with [`end_tick`](Self::end_tick) after answering the peer.
    pub fn begin_tick(&mut self, remote: u64) -> Result<Advance, ClockError> {
        self.in_flight = true;

        let target = remote.checked_mul(self.ratio).ok_or(ClockError::Overflow { remote })?;

        // End of the requested coarse timestamp. Past u64 nothing regresses.
        let horizon = remote.checked_add(1).and_then(|next| next.checked_mul(self.ratio));
        if horizon.is_some_and(|horizon| self.local >= horizon) {
            return Err(ClockError::Regression {
                local: self.local,
                remote,
                ratio: self.ratio,
            });
        }

        let coarse = self.local - self.local % self.ratio;
        if coarse != target {
            // coarse < target here, so the local clock is strictly behind.
            return Ok(Advance {
                remote,
                kind: AdvanceKind::Jump,
                delta: target - self.local,
                target,
            });
        }

        if self.last_remote.is_none() && self.local == target {
            // First tick of the session lands on the boundary we start at.
            return Ok(Advance { remote, kind: AdvanceKind::Jump, delta: 0, target });
        }

        let next = self.local.checked_add(self.min_step).ok_or(ClockError::Overflow { remote })?;
        Ok(Advance { remote, kind: AdvanceKind::Step, delta: self.min_step, target: next })
    }

    /// Commit a completed advance to the local clock.
    pub fn apply(&mut self, advance: &Advance) {
        debug_assert!(advance.target >= self.local, "local clock must not decrease");
        self.local = self.local.max(advance.target);
        self.last_remote = Some(advance.remote);
    }

    /// Close the in-flight tick.
    pub fn end_tick(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(ratio: u64) -> ClockSync {
        ClockSync::new(&ClockConfig { ratio, min_step: 1, ..ClockConfig::default() })
    }

    fn tick(clock: &mut ClockSync, remote: u64) -> Result<Advance, ClockError> {
        let advance = clock.begin_tick(remote);
        if let Ok(advance) = &advance {
            clock.apply(advance);
        }
        clock.end_tick();
        advance
    }

    #[test]
    fn first_tick_on_boundary_is_noop() {
        let mut clock = clock(1000);
        let advance = tick(&mut clock, 0).unwrap();
        assert_eq!(advance.kind, AdvanceKind::Jump);
        assert_eq!(advance.delta, 0);
        assert_eq!(clock.local(), 0);
    }

    #[test]
    fn jump_to_next_coarse_timestamp() {
        let mut clock = clock(1000);
        tick(&mut clock, 0).unwrap();
        let advance = tick(&mut clock, 1).unwrap();
        assert_eq!(advance, Advance { remote: 1, kind: AdvanceKind::Jump, delta: 1000, target: 1000 });
        assert_eq!(clock.local(), 1000);
    }

    #[test]
    fn repeated_ticks_step_by_min_step() {
        let mut clock = clock(1000);
        tick(&mut clock, 1).unwrap();
        assert_eq!(tick(&mut clock, 1).unwrap().kind, AdvanceKind::Step);
        assert_eq!(clock.local(), 1001);
        assert_eq!(tick(&mut clock, 1).unwrap().delta, 1);
        assert_eq!(clock.local(), 1002);
    }

    #[test]
    fn repeated_tick_at_zero_steps_after_first() {
        let mut clock = clock(1000);
        tick(&mut clock, 0).unwrap();
        tick(&mut clock, 0).unwrap();
        assert_eq!(clock.local(), 1);
    }

    #[test]
    fn configured_min_step_is_used() {
        let mut clock = ClockSync::new(&ClockConfig { ratio: 1000, min_step: 10, ..ClockConfig::default() });
        tick(&mut clock, 2).unwrap();
        tick(&mut clock, 2).unwrap();
        assert_eq!(clock.local(), 2010);
    }

    #[test]
    fn regression_is_rejected_without_moving_clock() {
        let mut clock = clock(1000);
        tick(&mut clock, 3).unwrap();
        let err = tick(&mut clock, 2).unwrap_err();
        assert_eq!(err, ClockError::Regression { local: 3000, remote: 2, ratio: 1000 });
        assert_eq!(clock.local(), 3000);
    }

    #[test]
    fn stepping_past_the_coarse_timestamp_regresses() {
        let mut clock = ClockSync::new(&ClockConfig { ratio: 2, min_step: 1, ..ClockConfig::default() });
        tick(&mut clock, 0).unwrap();
        tick(&mut clock, 0).unwrap();
        assert_eq!(clock.local(), 1);
        tick(&mut clock, 0).unwrap();
        assert_eq!(clock.local(), 2);
        assert!(matches!(tick(&mut clock, 0), Err(ClockError::Regression { .. })));

        // The next coarse timestamp is reached exactly; further ticks step.
        let advance = tick(&mut clock, 1).unwrap();
        assert_eq!(advance.kind, AdvanceKind::Step);
        assert_eq!(clock.local(), 3);
    }

    #[test]
    fn in_flight_spans_begin_to_end() {
        let mut clock = clock(1000);
        assert!(!clock.in_flight());
        let advance = clock.begin_tick(1).unwrap();
        assert!(clock.in_flight());
        clock.apply(&advance);
        assert!(clock.in_flight());
        clock.end_tick();
        assert!(!clock.in_flight());

        // Errors leave the tick open until the caller ends it.
        clock.begin_tick(0).unwrap_err();
        assert!(clock.in_flight());
    }

    #[test]
    fn huge_remote_time_overflows() {
        let mut clock = clock(1000);
        assert_eq!(tick(&mut clock, u64::MAX), Err(ClockError::Overflow { remote: u64::MAX }));
    }
}
