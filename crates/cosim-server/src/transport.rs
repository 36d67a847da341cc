//! TCP transport.
//!
//! Binds before any peer exists so the port can be announced, then accepts
//! exactly the one connection the session needs.

use std::net::SocketAddr;

use async_trait::async_trait;
use cosim_core::transport::Transport;
use tokio::net::{TcpListener, TcpStream};

/// Listening TCP socket for the peer.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `addr`. Port 0 picks an ephemeral port.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::debug!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    async fn accept(&self) -> std::io::Result<TcpStream> {
        let (stream, peer) = self.listener.accept().await?;
        // Messages are tiny and latency-bound.
        stream.set_nodelay(true)?;
        tracing::debug!("Accepted peer connection from {}", peer);
        Ok(stream)
    }
}
