//! Scripted peer simulator.
//!
//! Speaks the peer side of the protocol: writes commands, reads tagged
//! envelopes back.

use std::io;

use cosim_proto::{Envelope, ProtoError};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use turmoil::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use crate::SimTransport;

/// Peer side of a bridge connection.
#[derive(Debug)]
pub struct SimPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl SimPeer {
    /// Connect to the bridge at `host:port`.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = SimTransport::client().connect_to_host(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an established stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self { reader: BufReader::new(read), writer: write, line: String::new() }
    }

    /// Send raw bytes as-is.
    pub async fn send_raw(&mut self, data: &str) -> io::Result<()> {
        self.writer.write_all(data.as_bytes()).await
    }

    /// Next envelope from the bridge, or `None` once it closed the
    /// connection.
    pub async fn recv(&mut self) -> Result<Option<Envelope>, PeerError> {
        self.line.clear();
        match self.reader.read_line(&mut self.line).await {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(Envelope::parse(&self.line)?)),
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read every remaining envelope until the bridge closes.
    pub async fn drain(&mut self) -> Result<Vec<Envelope>, PeerError> {
        let mut received = Vec::new();
        while let Some(envelope) = self.recv().await? {
            received.push(envelope);
        }
        Ok(received)
    }

    /// Close the write side without sending END.
    pub async fn hangup(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Failures on the peer side of a simulated session.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Socket failure.
    #[error("peer I/O error: {0}")]
    Io(#[from] io::Error),
    /// The bridge sent something that is not an envelope.
    #[error("bridge sent invalid data: {0}")]
    Protocol(#[from] ProtoError),
}
