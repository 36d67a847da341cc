//! Server error types.

use std::{io, path::PathBuf};

use cosim_core::BridgeError;
use thiserror::Error;

/// Errors that prevent a run from starting or being supervised.
///
/// Failures inside a running session are not `ServerError`s; they end up in
/// the session report.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or announcing the listening socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The bridge could not be set up.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The peer process could not be launched.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Errors launching the peer process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A log file for the peer's output could not be created.
    #[error("cannot create peer log {}: {source}", path.display())]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The peer executable could not be started.
    #[error("failed to launch peer {program:?}: {source}")]
    Spawn {
        /// Program being launched.
        program: String,
        /// Underlying error.
        source: io::Error,
    },
}
