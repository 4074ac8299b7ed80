//! Line framing for the ping protocol.
//!
//! Lines are accumulated one byte at a time:
//! - `\r` ends the line. The byte after it is read and dropped whatever its
//!   value, so `\r\n` and `\r<anything>` both terminate.
//! - Backspace (`0x08`) removes the previously buffered byte. On an empty
//!   buffer it does nothing.
//! - Every other byte is appended as-is.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Carriage return, ends a line.
pub const CR: u8 = b'\r';

/// Backspace, erases the previous byte of the pending line.
pub const BACKSPACE: u8 = 0x08;

/// Initial capacity of the per-line accumulation buffer.
const LINE_CAPACITY: usize = 64;

/// Decodes logical lines from a byte stream.
pub struct LineReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next logical line.
    ///
    /// Returns `Ok(None)` when the peer closes the stream before a line is
    /// complete. Anything buffered for that partial line is dropped.
    pub async fn read_line(&mut self) -> io::Result<Option<BytesMut>> {
        let mut line = BytesMut::with_capacity(LINE_CAPACITY);

        loop {
            let byte = match self.next_byte().await? {
                Some(byte) => byte,
                None => return Ok(None),
            };

            match byte {
                CR => {
                    // Paired terminator byte. Its value is not checked and a
                    // missing one (EOF) still completes the line.
                    let _ = self.next_byte().await?;
                    return Ok(Some(line));
                }
                BACKSPACE => {
                    line.truncate(line.len().saturating_sub(1));
                }
                other => line.extend_from_slice(&[other]),
            }
        }
    }

    /// Access the wrapped stream, e.g. to write replies on it.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    async fn next_byte(&mut self) -> io::Result<Option<u8>> {
        match self.inner.read_u8().await {
            Ok(byte) => Ok(Some(byte)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}
