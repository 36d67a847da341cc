//! Inactivity deadline.
//!
//! Pure bookkeeping over caller-supplied instants. The runtime records
//! inbound commands as they arrive and calls [`Liveness::check`] on every
//! poll cycle. Hangs in the local simulator are bounded where the advance is
//! awaited, not here.

use std::{ops::Sub, time::Duration};

use crate::error::BridgeError;

/// Tracks whether the peer has gone silent.
#[derive(Debug, Clone)]
pub struct Liveness<I> {
    inactivity_timeout: Option<Duration>,
    last_message: Option<I>,
}

impl<I> Liveness<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// No messages seen yet.
    pub fn new(inactivity_timeout: Option<Duration>) -> Self {
        Self { inactivity_timeout, last_message: None }
    }

    /// A message arrived at `now`.
    pub fn on_message(&mut self, now: I) {
        self.last_message = Some(now);
    }

    /// Verify the peer has not been silent too long at `now`.
    ///
    /// The deadline only applies once a first message has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InactivityTimeout`] if messages have been seen
    /// but none within the inactivity timeout.
    pub fn check(&self, now: I) -> Result<(), BridgeError> {
        if let (Some(last), Some(timeout)) = (self.last_message, self.inactivity_timeout)
            && elapsed(now, last) > timeout
        {
            return Err(BridgeError::InactivityTimeout { after: timeout });
        }

        Ok(())
    }
}

fn elapsed<I>(now: I, since: I) -> Duration
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    if now > since { now - since } else { Duration::ZERO }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Virtual instant: duration since an arbitrary origin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct At(Duration);

    impl Sub for At {
        type Output = Duration;

        fn sub(self, other: Self) -> Duration {
            self.0.saturating_sub(other.0)
        }
    }

    fn secs(s: u64) -> At {
        At(Duration::from_secs(s))
    }

    #[test]
    fn silent_before_first_message() {
        let liveness = Liveness::new(Some(Duration::from_secs(10)));
        assert!(liveness.check(secs(1_000)).is_ok());
    }

    #[test]
    fn inactivity_after_last_message() {
        let mut liveness = Liveness::new(Some(Duration::from_secs(10)));
        liveness.on_message(secs(3));
        assert!(liveness.check(secs(13)).is_ok());
        assert!(matches!(
            liveness.check(secs(14)),
            Err(BridgeError::InactivityTimeout { after }) if after == Duration::from_secs(10)
        ));

        liveness.on_message(secs(14));
        assert!(liveness.check(secs(20)).is_ok());
    }

    #[test]
    fn inactivity_disabled() {
        let mut liveness = Liveness::new(None);
        liveness.on_message(secs(0));
        assert!(liveness.check(secs(1_000_000)).is_ok());
    }

    #[test]
    fn clock_skew_does_not_underflow() {
        let mut liveness = Liveness::new(Some(Duration::from_secs(1)));
        liveness.on_message(secs(50));
        assert!(liveness.check(secs(10)).is_ok());
    }
}
