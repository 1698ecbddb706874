//! Buffered transport collaborator.
//!
//! The protocol engines consume the byte stream through [`Reader`] and
//! [`Writer`] only; TLS, sockets and in-memory pipes all enter through
//! the same boxed [`AsyncRead`]/[`AsyncWrite`] seam.
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 8 * 1024;

/// Split a duplex stream into a buffered [`Reader`] and a [`Writer`].
pub fn split<T>(io: T) -> (Reader, Writer)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (r, w) = tokio::io::split(io);
    (Reader::new(r), Writer::new(w))
}

// ===== Reader =====

/// Buffered byte-stream reader.
pub struct Reader {
    io: Box<dyn AsyncRead + Send + Unpin>,
    buffer: BytesMut,
    eof: bool,
}

impl Reader {
    pub fn new(io: impl AsyncRead + Send + Unpin + 'static) -> Reader {
        Reader {
            io: Box::new(io),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Read exactly `n` bytes.
    ///
    /// Returns fewer bytes only when the stream ends first.
    pub async fn read(&mut self, n: usize) -> io::Result<Bytes> {
        while self.buffer.len() < n && !self.eof {
            self.fill().await?;
        }
        let take = n.min(self.buffer.len());
        Ok(self.buffer.split_to(take).freeze())
    }

    /// Read up to and including `delim`, returning the bytes before it.
    ///
    /// The delimiter is consumed but not returned. At end-of-stream the
    /// residual buffer is returned as-is.
    pub async fn read_until(&mut self, delim: &[u8]) -> io::Result<Bytes> {
        debug_assert!(!delim.is_empty());

        let mut searched = 0;
        loop {
            if let Some(at) = find(&self.buffer[searched..], delim) {
                let data = self.buffer.split_to(searched + at).freeze();
                self.buffer.advance(delim.len());
                return Ok(data);
            }

            if self.eof {
                return Ok(self.buffer.split().freeze());
            }

            // a partial delimiter may straddle the refill boundary
            searched = self.buffer.len().saturating_sub(delim.len() - 1);
            self.fill().await?;
        }
    }

    /// Whether the stream reached its end and the buffer is drained.
    pub fn at_eof(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }

    async fn fill(&mut self) -> io::Result<()> {
        self.buffer.reserve(READ_CHUNK);
        let read = self.io.read_buf(&mut self.buffer).await?;
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ===== Writer =====

/// Buffered byte-stream writer.
///
/// [`write`][Writer::write] only buffers; [`drain`][Writer::drain]
/// suspends until everything buffered reached the transport.
pub struct Writer {
    io: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    buffer: BytesMut,
    peer: Option<SocketAddr>,
    selected_protocol: Option<String>,
}

impl Writer {
    pub fn new(io: impl AsyncWrite + Send + Unpin + 'static) -> Writer {
        Writer {
            io: Some(Box::new(io)),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            peer: None,
            selected_protocol: None,
        }
    }

    /// Queue bytes for sending.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Flush everything queued to the transport.
    ///
    /// # Errors
    ///
    /// Fails with `BrokenPipe` once the writer is closing.
    pub async fn drain(&mut self) -> io::Result<()> {
        let io = self
            .io
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        while !self.buffer.is_empty() {
            let written = io.write_buf(&mut self.buffer).await?;
            if written == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
        }
        io.flush().await
    }

    /// Close the write side; queued but undrained bytes are dropped.
    pub fn close(&mut self) {
        self.io = None;
        self.buffer.clear();
    }

    /// Whether [`close`][Writer::close] was called.
    pub fn is_closing(&self) -> bool {
        self.io.is_none()
    }

    /// Remote address, when the transport knows one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn set_peer_addr(&mut self, addr: SocketAddr) {
        self.peer = Some(addr);
    }

    /// Negotiated ALPN protocol name, when the transport knows one.
    pub fn selected_protocol(&self) -> Option<&str> {
        self.selected_protocol.as_deref()
    }

    pub fn set_selected_protocol(&mut self, name: impl Into<String>) {
        self.selected_protocol = Some(name.into());
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("queued", &self.buffer.len())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

// ===== Test =====

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_exact_and_eof() {
        let mut reader = Reader::new(&b"hello world"[..]);
        assert_eq!(reader.read(5).await.unwrap(), &b"hello"[..]);
        assert_eq!(reader.read(100).await.unwrap(), &b" world"[..]);
        assert!(reader.at_eof());
        assert_eq!(reader.read(1).await.unwrap(), &b""[..]);
    }

    #[tokio::test]
    async fn test_read_until() {
        let mut reader = Reader::new(&b"GET / HTTP/1.1\r\n\r\nrest"[..]);
        let head = reader.read_until(b"\r\n\r\n").await.unwrap();
        assert_eq!(head, &b"GET / HTTP/1.1"[..]);
        assert_eq!(reader.read(4).await.unwrap(), &b"rest"[..]);
    }

    #[tokio::test]
    async fn test_read_until_eof_residual() {
        let mut reader = Reader::new(&b"partial"[..]);
        let rest = reader.read_until(b"\r\n").await.unwrap();
        assert_eq!(rest, &b"partial"[..]);
        assert!(reader.at_eof());
    }

    #[tokio::test]
    async fn test_writer_roundtrip() {
        let (client, mut server) = tokio::io::duplex(64);
        let (_, mut writer) = split(client);

        writer.write(b"ping");
        writer.drain().await.unwrap();

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        writer.close();
        assert!(writer.is_closing());
        assert!(writer.drain().await.is_err());
    }
}
