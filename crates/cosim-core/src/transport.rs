//! Transport abstraction.
//!
//! The bridge listens; the peer connects. Production uses TCP, simulation
//! uses Turmoil's virtual network. Both hand the bridge a byte stream.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bound listener the peer connects to.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Established connection to the peer.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Port the listener is bound to. Available before any peer connects.
    fn local_port(&self) -> std::io::Result<u16>;

    /// Wait for the peer to connect.
    async fn accept(&self) -> std::io::Result<Self::Stream>;
}
