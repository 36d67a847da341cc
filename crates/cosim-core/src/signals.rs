//! Signal registration and the seams to the local simulator.
//!
//! The simulator owns its signals. The bridge holds shared references:
//! inputs it may write when the peer drives them, outputs it observes and
//! reports. Values travel as opaque strings; encoding is the simulator's
//! business.

use std::{collections::BTreeMap, fmt, sync::Arc};

use thiserror::Error;
use tokio::sync::watch;

use crate::error::BridgeError;

/// Characters that would break the wire grammar if they appeared in a name.
const RESERVED_NAME_CHARS: &[char] = &[':', ';', '=', '@'];

/// Four-state logic characters accepted by [`Wire::logic`].
const LOGIC_CHARS: &[char] = &['0', '1', 'x', 'X', 'z', 'Z'];

/// A local signal the peer may drive.
pub trait InputSignal: Send + Sync {
    /// Apply a serialized value.
    fn drive(&self, value: &str) -> Result<(), DriveError>;
}

/// A local signal the bridge reports to the peer.
pub trait OutputSignal: Send + Sync {
    /// Current serialized value.
    fn value(&self) -> String;

    /// Start observing changes.
    fn subscribe(&self) -> Subscription;
}

/// Change notifications for one output signal.
///
/// Dropping the subscription cancels it.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<String>,
}

impl Subscription {
    /// Wrap a watch receiver fed by the simulator.
    pub fn new(rx: watch::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Current value, marking it as observed.
    pub fn current(&mut self) -> String {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next change and return the new value.
    ///
    /// Changes that land between two calls coalesce into the latest value.
    /// Returns `None` once the signal's source is gone.
    pub async fn changed(&mut self) -> Option<String> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

/// A drive the local simulator could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriveError {
    /// The value is not valid for this signal.
    #[error("malformed value {value:?}: {reason}")]
    Malformed {
        /// Value as received.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The simulator rejected the write.
    #[error("rejected by simulator: {0}")]
    Rejected(String),
}

/// Invalid signal registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// Empty name, whitespace, or a protocol delimiter.
    #[error("invalid signal name {0:?}")]
    InvalidName(String),

    /// Name already registered in the same direction.
    #[error("{direction} signal {name:?} already registered")]
    Duplicate {
        /// Signal name.
        name: String,
        /// `"input"` or `"output"`.
        direction: &'static str,
    },
}

/// Names the peer may drive and names the bridge reports.
///
/// Entries are added before the session starts and never removed.
#[derive(Default, Clone)]
pub struct SignalMap {
    inputs: BTreeMap<String, Arc<dyn InputSignal>>,
    outputs: BTreeMap<String, Arc<dyn OutputSignal>>,
}

impl SignalMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal the peer may drive.
    pub fn register_input(
        &mut self,
        name: impl Into<String>,
        signal: Arc<dyn InputSignal>,
    ) -> Result<&mut Self, SignalError> {
        let name = checked_name(name.into())?;
        if self.inputs.contains_key(&name) {
            return Err(SignalError::Duplicate { name, direction: "input" });
        }
        self.inputs.insert(name, signal);
        Ok(self)
    }

    /// Register a signal the bridge reports.
    pub fn register_output(
        &mut self,
        name: impl Into<String>,
        signal: Arc<dyn OutputSignal>,
    ) -> Result<&mut Self, SignalError> {
        let name = checked_name(name.into())?;
        if self.outputs.contains_key(&name) {
            return Err(SignalError::Duplicate { name, direction: "output" });
        }
        self.outputs.insert(name, signal);
        Ok(self)
    }

    /// Register `wire` as both an input and an output under `name`.
    pub fn register_wire(
        &mut self,
        name: impl Into<String>,
        wire: &Wire,
    ) -> Result<&mut Self, SignalError> {
        let name = name.into();
        self.register_input(name.clone(), Arc::new(wire.clone()))?;
        self.register_output(name, Arc::new(wire.clone()))
    }

    /// Apply a peer drive to the named input.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownSignal`] if `name` is not a registered input
    /// - [`BridgeError::DriveApplication`] if the signal rejects the value
    pub fn drive(&self, name: &str, value: &str) -> Result<(), BridgeError> {
        let signal = self
            .inputs
            .get(name)
            .ok_or_else(|| BridgeError::UnknownSignal { name: name.to_owned() })?;
        signal
            .drive(value)
            .map_err(|source| BridgeError::DriveApplication { name: name.to_owned(), source })
    }

    /// Registered outputs in name order.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Arc<dyn OutputSignal>)> {
        self.outputs.iter().map(|(name, signal)| (name.as_str(), signal))
    }
}

impl fmt::Debug for SignalMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalMap")
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn checked_name(name: String) -> Result<String, SignalError> {
    let valid = !name.is_empty()
        && !name.chars().any(|c| c.is_whitespace() || RESERVED_NAME_CHARS.contains(&c));
    if valid { Ok(name) } else { Err(SignalError::InvalidName(name)) }
}

/// An in-process signal usable as both input and output.
///
/// Clones share the same value. Writing an identical value is not a change
/// and wakes no observer.
#[derive(Debug, Clone)]
pub struct Wire {
    value: Arc<watch::Sender<String>>,
    width: Option<usize>,
}

impl Wire {
    /// A wire that accepts any non-empty value.
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { value: Arc::new(tx), width: None }
    }

    /// A four-state logic vector of `width` bits, initially all `x`.
    ///
    /// Drives must be exactly `width` characters from `0 1 x X z Z`.
    pub fn logic(width: usize) -> Self {
        let (tx, _rx) = watch::channel("x".repeat(width));
        Self { value: Arc::new(tx), width: Some(width) }
    }

    /// Current value.
    pub fn get(&self) -> String {
        self.value.borrow().clone()
    }

    /// Set the value from the simulator's side. Returns true if it changed.
    pub fn set(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.value.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }

    fn validate(&self, value: &str) -> Result<(), DriveError> {
        let malformed =
            |reason: String| DriveError::Malformed { value: value.to_owned(), reason };

        if value.is_empty() {
            return Err(malformed("empty value".into()));
        }
        let Some(width) = self.width else {
            return Ok(());
        };
        if let Some(bad) = value.chars().find(|c| !LOGIC_CHARS.contains(c)) {
            return Err(malformed(format!("{bad:?} is not a logic value")));
        }
        if value.len() != width {
            return Err(malformed(format!("expected {width} bits, got {}", value.len())));
        }
        Ok(())
    }
}

impl InputSignal for Wire {
    fn drive(&self, value: &str) -> Result<(), DriveError> {
        self.validate(value)?;
        self.set(value);
        Ok(())
    }
}

impl OutputSignal for Wire {
    fn value(&self) -> String {
        self.get()
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.value.subscribe())
    }
}
