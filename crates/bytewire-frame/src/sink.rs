use std::io::{self, ErrorKind, Write};

/// Where composed frame bytes go.
///
/// Called once per flush of the transmit buffer, so a single frame may
/// arrive in several pieces.
pub trait Sink: Send {
    /// Hand one filled buffer to the transport.
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<F> Sink for F
where
    F: FnMut(&[u8]) -> io::Result<()> + Send,
{
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self(bytes)
    }
}

/// Adapts any `Write` stream (serial port, socket, pipe) into a [`Sink`].
#[derive(Debug)]
pub struct IoSink<W> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the sink and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<W: Write + Send> Sink for IoSink<W> {
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err),
            }
        }
        self.flush()
    }
}
