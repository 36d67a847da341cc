//! Shutdown state.
//!
//! A session can be asked to stop from several places at once: an error in
//! the dispatch loop, an `END` from the peer, the process supervisor. Only
//! the first request may notify the peer and close the connection.
//!
//! ```text
//! Active ──begin()──> ShuttingDown ──close()──> Closed
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a session's shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    /// Session running.
    Active = 0,
    /// Notify-and-close sequence in progress.
    ShuttingDown = 1,
    /// Connection closed; terminal.
    Closed = 2,
}

impl ShutdownState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }
}

/// Atomic, one-way shutdown latch.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    state: AtomicU8,
}

impl ShutdownLatch {
    /// Latch in [`ShutdownState::Active`].
    pub const fn new() -> Self {
        Self { state: AtomicU8::new(ShutdownState::Active as u8) }
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the session is still running.
    pub fn is_active(&self) -> bool {
        self.state() == ShutdownState::Active
    }

    /// Move `Active → ShuttingDown`.
    ///
    /// Returns true for exactly one caller: the one that must run the
    /// notify-and-close sequence.
    pub fn begin(&self) -> bool {
        self.state
            .compare_exchange(
                ShutdownState::Active as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed` from any state.
    pub fn close(&self) {
        self.state.store(ShutdownState::Closed as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use super::*;

    #[test]
    fn begin_wins_once() {
        let latch = ShutdownLatch::new();
        assert!(latch.is_active());
        assert!(latch.begin());
        assert_eq!(latch.state(), ShutdownState::ShuttingDown);
        assert!(!latch.begin());
        latch.close();
        assert_eq!(latch.state(), ShutdownState::Closed);
        assert!(!latch.begin());
    }

    #[test]
    fn concurrent_begin_has_single_winner() {
        let latch = Arc::new(ShutdownLatch::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if latch.begin() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_without_begin_is_terminal() {
        let latch = ShutdownLatch::new();
        latch.close();
        assert!(!latch.is_active());
        assert!(!latch.begin());
    }
}
