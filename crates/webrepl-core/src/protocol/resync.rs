//! Resynchronizing reader for `"WB"` acknowledgements.
//!
//! The device does not always leave the wire clean when it switches from the
//! text REPL to the binary file-transfer dialect: echo characters, a stray
//! prompt or a half-flushed line can arrive *before* the acknowledgement.
//! [`AckScanner`] is fed whatever the socket delivers, one message at a time,
//! and reports the status code as soon as a complete `"WB" + u16` record has
//! been seen anywhere in the accumulated bytes.

use tracing::trace;

use super::frame::{ResponseCode, RESPONSE_FRAME_LEN, RESPONSE_SIGNATURE};

/// Accumulates incoming bytes until a response frame can be extracted.
#[derive(Debug, Default)]
pub struct AckScanner {
    buf: Vec<u8>,
    discarded: usize,
}

impl AckScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and tries to extract a response code.
    ///
    /// Returns `Some(code)` once the signature and both status bytes are
    /// present.  Bytes before the signature are dropped.  Bytes after the
    /// frame are kept and can be recovered with [`AckScanner::take_remaining`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use webrepl_core::protocol::resync::AckScanner;
    ///
    /// let mut scanner = AckScanner::new();
    /// assert_eq!(scanner.push(b"\x00\x00garbageW"), None);
    /// let code = scanner.push(b"B\x00\x00").unwrap();
    /// assert!(code.is_success());
    /// ```
    pub fn push(&mut self, bytes: &[u8]) -> Option<ResponseCode> {
        self.buf.extend_from_slice(bytes);

        match find_signature(&self.buf) {
            Some(start) => {
                if start > 0 {
                    trace!(skipped = start, "discarding bytes before ack signature");
                    self.discarded += start;
                    self.buf.drain(..start);
                }
                if self.buf.len() < RESPONSE_FRAME_LEN {
                    return None;
                }
                let code = u16::from_le_bytes([self.buf[2], self.buf[3]]);
                self.buf.drain(..RESPONSE_FRAME_LEN);
                Some(ResponseCode(code))
            }
            None => {
                // A trailing 'W' may be the first half of a split signature.
                let keep = usize::from(self.buf.last() == Some(&RESPONSE_SIGNATURE[0]));
                let drop = self.buf.len() - keep;
                self.discarded += drop;
                self.buf.drain(..drop);
                None
            }
        }
    }

    /// Number of noise bytes skipped so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Returns and clears any bytes buffered after the last extracted frame.
    pub fn take_remaining(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

fn find_signature(buf: &[u8]) -> Option<usize> {
    buf.windows(RESPONSE_SIGNATURE.len())
        .position(|w| w == RESPONSE_SIGNATURE)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
