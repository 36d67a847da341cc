//! One peer connection: framed reads, tagged writes, single close.

use cosim_core::BridgeError;
use cosim_proto::{Envelope, Framer, Outbound};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 4096;

/// Byte stream to the peer with the framing state attached.
///
/// The stream is dropped on [`close`](Self::close); every later send fails
/// and every later close is a no-op.
#[derive(Debug)]
pub struct Connection<S> {
    stream: Option<S>,
    framer: Framer,
    buf: Vec<u8>,
    bytes_in: u64,
    bytes_out: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an accepted stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            framer: Framer::new(),
            buf: vec![0; READ_CHUNK],
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Whether the stream is still held.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Total bytes read and written.
    pub fn byte_counts(&self) -> (u64, u64) {
        (self.bytes_in, self.bytes_out)
    }

    /// Read once and return the messages completed by the new bytes.
    ///
    /// Returns `Ok(None)` when the peer closed its side. Cancel safe: if the
    /// future is dropped before the read completes, no bytes were consumed.
    pub async fn read(&mut self) -> Result<Option<Vec<String>>, BridgeError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let n = stream.read(&mut self.buf).await?;
        if n == 0 {
            if let Some(partial) = self.framer.take_partial() {
                tracing::debug!(%partial, "Discarding unterminated message at end of stream");
            }
            return Ok(None);
        }

        self.bytes_in += n as u64;
        Ok(Some(self.framer.push(&self.buf[..n])?))
    }

    /// Write one message tagged with the local time.
    pub async fn send(&mut self, time: u64, body: &Outbound) -> Result<(), BridgeError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(BridgeError::Communication { reason: "connection already closed".into() });
        };

        let wire = Envelope::new(time, body.clone()).encode();
        stream.write_all(wire.as_bytes()).await?;
        stream.flush().await?;
        self.bytes_out += wire.len() as u64;
        Ok(())
    }

    /// Shut down the write side and release the stream.
    ///
    /// Returns true only for the call that actually closed it.
    pub async fn close(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };

        if let Err(e) = stream.shutdown().await {
            tracing::debug!("Ignoring error while closing connection: {}", e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn reads_split_messages_across_calls() {
        let (near, mut far) = duplex(64);
        let mut conn = Connection::new(near);

        far.write_all(b"TICK:1;DRI").await.unwrap();
        assert_eq!(conn.read().await.unwrap(), Some(vec!["TICK:1".to_string()]));

        far.write_all(b"VE:a:1\n").await.unwrap();
        assert_eq!(conn.read().await.unwrap(), Some(vec!["DRIVE:a:1".to_string()]));

        drop(far);
        assert_eq!(conn.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sends_tagged_lines() {
        let (near, mut far) = duplex(64);
        let mut conn = Connection::new(near);

        conn.send(1000, &Outbound::TickComplete).await.unwrap();
        conn.send(1000, &Outbound::End).await.unwrap();
        assert!(conn.close().await);

        let mut received = String::new();
        far.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "@1000:TICK_COMPLETE\n@1000:END\n");
        assert_eq!(conn.byte_counts().1, received.len() as u64);
    }

    #[tokio::test]
    async fn close_happens_once() {
        let (near, _far) = duplex(64);
        let mut conn = Connection::new(near);

        assert!(conn.close().await);
        assert!(!conn.close().await);
        assert!(!conn.is_open());
        assert!(matches!(
            conn.send(0, &Outbound::End).await,
            Err(BridgeError::Communication { .. })
        ));
    }
}
