use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::checksum::Checksum;
use crate::codec::Message;
use crate::config::FrameConfig;
use crate::error::{FrameError, Result};
use crate::parser::{ParseEvent, Parser};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads verified messages from any blocking `Read` stream.
///
/// Corrupt, oversize, and truncated frames are logged and skipped; callers
/// only ever see messages whose checksums matched.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    parser: Parser,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader using the checksum named in the config.
    pub fn new(inner: T, config: FrameConfig) -> Self {
        Self::from_parser(inner, Parser::new(config))
    }

    /// Create a reader with an explicit (possibly custom) checksum.
    pub fn with_checksum(inner: T, config: FrameConfig, checksum: Arc<dyn Checksum>) -> Self {
        Self::from_parser(inner, Parser::with_checksum(config, checksum))
    }

    fn from_parser(inner: T, parser: Parser) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            parser,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            while self.buf.has_remaining() {
                match self.parser.accept_byte(self.buf.get_u8()) {
                    Some(ParseEvent::Message(msg)) => return Ok(msg),
                    Some(ParseEvent::Error(err)) => {
                        tracing::warn!(error = %err, "skipping corrupt frame");
                    }
                    None => {}
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Drive the parser's stall timer; see [`Parser::tick`].
    pub fn tick(&mut self) {
        if let Some(err) = self.parser.tick() {
            tracing::warn!(error = %err, "partial frame timed out");
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// The parser driving this reader.
    pub fn parser(&self) -> &Parser {
        &self.parser
    }
}
