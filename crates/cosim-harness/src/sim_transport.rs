//! Turmoil TCP transport.

use std::{fmt, io};

use async_trait::async_trait;
use cosim_core::transport::Transport;
use turmoil::net::{TcpListener, TcpStream};

/// Simulated TCP endpoint.
///
/// Listening side via [`bind`](Self::bind), connecting side via
/// [`client`](Self::client).
pub struct SimTransport {
    listener: Option<TcpListener>,
}

impl SimTransport {
    /// Listen on `addr` inside the simulation.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener: Some(listener) })
    }

    /// Connecting-only endpoint.
    pub fn client() -> Self {
        Self { listener: None }
    }

    /// Connect to `host:port` inside the simulation.
    pub async fn connect_to_host(&self, addr: &str) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }

    fn listener(&self) -> io::Result<&TcpListener> {
        self.listener
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is not listening"))
    }
}

impl fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimTransport").field("listening", &self.listener.is_some()).finish()
    }
}

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    fn local_port(&self) -> io::Result<u16> {
        Ok(self.listener()?.local_addr()?.port())
    }

    async fn accept(&self) -> io::Result<TcpStream> {
        let (stream, _peer) = self.listener()?.accept().await?;
        Ok(stream)
    }
}
