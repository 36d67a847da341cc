//! Inbound message framing.
//!
//! Socket reads deliver arbitrary slices of the peer's byte stream. The
//! [`Framer`] owns the bytes that have not yet formed a complete message and
//! carries that unterminated tail across reads.
//!
//! # Invariants
//!
//! - Chunking independence: feeding a stream in any number of chunks yields
//!   exactly the messages produced by feeding it whole
//! - No duplication: a separator is consumed exactly once
//! - Bounded: the unterminated tail never exceeds [`MAX_PENDING_BYTES`]

use bytes::BytesMut;

use crate::error::ProtoError;

/// Upper bound on an unterminated message.
///
/// Protocol messages are short; a tail this long means the peer is not
/// speaking the protocol.
pub const MAX_PENDING_BYTES: usize = 1 << 20;

/// Returns true for bytes that terminate a message (`;` or newline).
pub const fn is_separator(byte: u8) -> bool {
    byte == b';' || byte == b'\n'
}

/// Splits a byte stream into separator-delimited messages.
#[derive(Debug, Default)]
pub struct Framer {
    pending: BytesMut,
}

impl Framer {
    /// Create a framer with an empty pending buffer.
    pub fn new() -> Self {
        Self { pending: BytesMut::with_capacity(1024) }
    }

    /// Append `chunk` and return every message it completes, in order.
    ///
    /// Segments that are empty or whitespace-only after trimming are skipped.
    /// Bytes after the last separator stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::MessageTooLarge`] if the unterminated tail grows
    /// past [`MAX_PENDING_BYTES`]. The pending buffer is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ProtoError> {
        // Only the new bytes can hold a separator; the tail never does.
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let Some(last) = self.pending[scan_from..].iter().rposition(|&b| is_separator(b)) else {
            return self.check_tail().map(|()| Vec::new());
        };

        let complete = self.pending.split_to(scan_from + last + 1);
        let messages = complete[..]
            .split(|&b| is_separator(b))
            .filter_map(|segment| {
                let text = String::from_utf8_lossy(segment);
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            })
            .collect();

        self.check_tail()?;
        Ok(messages)
    }

    /// Number of buffered bytes not yet forming a message.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take the unterminated tail, if it holds anything but whitespace.
    ///
    /// Used when the stream ends to report a truncated final message.
    pub fn take_partial(&mut self) -> Option<String> {
        let tail = self.pending.split();
        let text = String::from_utf8_lossy(&tail);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    fn check_tail(&mut self) -> Result<(), ProtoError> {
        let len = self.pending.len();
        if len > MAX_PENDING_BYTES {
            self.pending.clear();
            return Err(ProtoError::MessageTooLarge { len, max: MAX_PENDING_BYTES });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons_and_newlines() {
        let mut framer = Framer::new();
        let messages = framer.push(b"TICK:1;DRIVE:a:1\nEND;").unwrap();
        assert_eq!(messages, vec!["TICK:1", "DRIVE:a:1", "END"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn one_chunk_completes_many_messages_and_keeps_tail() {
        let mut framer = Framer::new();
        assert!(framer.push(b"TI").unwrap().is_empty());

        let messages = framer.push(b"CK:0;TICK:1\n\nDRIVE:a:1;EN").unwrap();
        assert_eq!(messages, vec!["TICK:0", "TICK:1", "DRIVE:a:1"]);
        assert_eq!(framer.take_partial().as_deref(), Some("EN"));
    }

    #[test]
    fn buffers_unterminated_tail() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"TICK:1;TI").unwrap(), vec!["TICK:1"]);
        assert_eq!(framer.pending_len(), 2);

        assert!(framer.push(b"CK:").unwrap().is_empty());
        assert_eq!(framer.push(b"2;").unwrap(), vec!["TICK:2"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn skips_blank_segments_and_trims() {
        let mut framer = Framer::new();
        let messages = framer.push(b";;  ;\r\n  END \r\n;").unwrap();
        assert_eq!(messages, vec!["END"]);
    }

    #[test]
    fn separator_split_from_message_is_not_duplicated() {
        let mut framer = Framer::new();
        assert!(framer.push(b"END").unwrap().is_empty());
        assert_eq!(framer.push(b";").unwrap(), vec!["END"]);
        assert!(framer.push(b";").unwrap().is_empty());
    }

    #[test]
    fn take_partial_returns_trailing_fragment() {
        let mut framer = Framer::new();
        framer.push(b"END;DRIVE:a").unwrap();
        assert_eq!(framer.take_partial().as_deref(), Some("DRIVE:a"));
        assert_eq!(framer.take_partial(), None);
    }

    #[test]
    fn oversized_tail_is_rejected() {
        let mut framer = Framer::new();
        let junk = vec![b'x'; MAX_PENDING_BYTES + 1];
        let err = framer.push(&junk).unwrap_err();
        assert!(matches!(err, ProtoError::MessageTooLarge { .. }));
        assert_eq!(framer.pending_len(), 0);
    }
}
