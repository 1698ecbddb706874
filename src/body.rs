//! Message body readers.
//!
//! A body reader is a lazy sequence of decoded payload blocks over a
//! transport [`Reader`]; framing bytes never reach the caller. One reader
//! is created per exchange and driven by repeated [`next`][BodyReader::next]
//! calls until it reports completion.
use bytes::{Bytes, BytesMut};
use std::io;

use crate::headers::{HeaderParseError, Headers};
use crate::stream::Reader;

/// Default maximum block size emitted by body readers.
pub const DEFAULT_BLOCK_SIZE: usize = 65_536;

/// Either framing flavor behind one seam.
#[derive(Debug)]
pub enum BodyReader {
    Buffered(BufferedBodyReader),
    Chunked(ChunkedBodyReader),
}

impl BodyReader {
    /// Reader for an identity body of exactly `body_size` bytes.
    pub fn buffered(body_size: u64) -> BodyReader {
        BodyReader::Buffered(BufferedBodyReader::new(body_size))
    }

    /// Reader for a chunked-coded body.
    pub fn chunked() -> BodyReader {
        BodyReader::Chunked(ChunkedBodyReader::new())
    }

    /// The next payload block, or `None` once the body ends.
    pub async fn next(&mut self, reader: &mut Reader) -> Result<Option<Bytes>, BodyError> {
        match self {
            BodyReader::Buffered(b) => b.next(reader).await,
            BodyReader::Chunked(c) => c.next(reader).await,
        }
    }

    /// Whether the full body was emitted.
    pub fn is_complete(&self) -> bool {
        match self {
            BodyReader::Buffered(b) => b.is_complete(),
            BodyReader::Chunked(c) => c.is_complete(),
        }
    }

    /// Decoded payload bytes produced so far.
    pub fn body_size(&self) -> u64 {
        match self {
            BodyReader::Buffered(b) => b.bytes_read,
            BodyReader::Chunked(c) => c.body_size,
        }
    }

    /// Trailer fields, populated after a chunked body completes.
    pub fn trailers(&self) -> Option<&Headers> {
        match self {
            BodyReader::Buffered(_) => None,
            BodyReader::Chunked(c) => Some(&c.headers),
        }
    }

    /// Read and discard the remainder of the body.
    pub async fn drain(&mut self, reader: &mut Reader) -> Result<(), BodyError> {
        while self.next(reader).await?.is_some() {}
        Ok(())
    }

    /// Accumulate the remaining blocks into one buffer.
    pub async fn read_to_end(&mut self, reader: &mut Reader) -> Result<Bytes, BodyError> {
        let mut out = BytesMut::new();
        while let Some(block) = self.next(reader).await? {
            out.extend_from_slice(&block);
        }
        Ok(out.freeze())
    }
}

// ===== Buffered =====

/// Lazy block sequence over an identity-coded body of known size.
///
/// Emits blocks of at most `block_size` bytes whose concatenation is
/// exactly `body_size` bytes.
#[derive(Debug)]
pub struct BufferedBodyReader {
    body_size: u64,
    block_size: usize,
    bytes_read: u64,
}

impl BufferedBodyReader {
    pub fn new(body_size: u64) -> BufferedBodyReader {
        Self::with_block_size(body_size, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(body_size: u64, block_size: usize) -> BufferedBodyReader {
        assert!(block_size > 0);
        BufferedBodyReader {
            body_size,
            block_size,
            bytes_read: 0,
        }
    }

    /// The next block, or `None` after `body_size` bytes were emitted.
    ///
    /// # Errors
    ///
    /// [`BodyError::UnexpectedEof`] when the transport ends early.
    pub async fn next(&mut self, reader: &mut Reader) -> Result<Option<Bytes>, BodyError> {
        let remaining = self.body_size - self.bytes_read;
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.block_size as u64) as usize;
        let block = reader.read(want).await?;
        if block.len() < want {
            // the transport returns short reads only at end-of-stream
            return Err(BodyError::UnexpectedEof);
        }

        self.bytes_read += block.len() as u64;
        Ok(Some(block))
    }

    /// Whether all `body_size` bytes were emitted.
    pub fn is_complete(&self) -> bool {
        self.bytes_read == self.body_size
    }
}

// ===== Chunked =====

/// Lazy block sequence over a chunked-coded body.
///
/// Consumes the hex size line, the chunk payload and its CRLF per chunk;
/// after the zero chunk, trailer field lines are collected into
/// `headers` until a blank line.
#[derive(Debug)]
pub struct ChunkedBodyReader {
    /// Decoded payload bytes read so far.
    body_size: u64,
    /// Trailer fields, empty until the body completes.
    headers: Headers,
    complete: bool,
}

impl ChunkedBodyReader {
    pub fn new() -> ChunkedBodyReader {
        ChunkedBodyReader {
            body_size: 0,
            headers: Headers::new(),
            complete: false,
        }
    }

    /// The next chunk payload, or `None` after the zero chunk.
    ///
    /// # Errors
    ///
    /// [`BodyError::InvalidChunk`] on a malformed size line, a short
    /// chunk, or a missing chunk CRLF.
    pub async fn next(&mut self, reader: &mut Reader) -> Result<Option<Bytes>, BodyError> {
        if self.complete {
            return Ok(None);
        }

        let line = reader.read_until(b"\r\n").await?;
        let digits = std::str::from_utf8(&line)
            .map_err(|_| BodyError::InvalidChunk("malformed chunk size line"))?
            .trim();
        let chunk_size = u64::from_str_radix(digits, 16)
            .map_err(|_| BodyError::InvalidChunk("malformed chunk size line"))?;

        if chunk_size == 0 {
            self.read_trailer(reader).await?;
            self.complete = true;
            return Ok(None);
        }

        let chunk = reader.read(chunk_size as usize).await?;
        if chunk.len() as u64 != chunk_size {
            return Err(BodyError::InvalidChunk("chunk shorter than its size"));
        }
        if reader.read(2).await? != &b"\r\n"[..] {
            return Err(BodyError::InvalidChunk("chunk not followed by CRLF"));
        }

        self.body_size += chunk_size;
        Ok(Some(chunk))
    }

    /// Whether the zero chunk and trailer were consumed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Trailer field lines until a blank line.
    async fn read_trailer(&mut self, reader: &mut Reader) -> Result<(), BodyError> {
        loop {
            let line = reader.read_until(b"\r\n").await?;
            if line.is_empty() {
                return Ok(());
            }
            let (name, values) = Headers::parse_line(&line)?;
            self.headers.add(&name, values);
        }
    }
}

impl Default for ChunkedBodyReader {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Error =====

/// Body framing failure.
#[derive(Debug)]
pub enum BodyError {
    /// Transport failed underneath the body.
    Io(io::Error),
    /// End-of-stream before the declared body size.
    UnexpectedEof,
    /// Chunked framing violation.
    InvalidChunk(&'static str),
    /// Malformed trailer field line.
    InvalidTrailer(HeaderParseError),
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BodyError::Io(e) => Some(e),
            BodyError::InvalidTrailer(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyError::Io(e) => write!(f, "transport error: {e}"),
            BodyError::UnexpectedEof => f.write_str("end of stream before body was complete"),
            BodyError::InvalidChunk(msg) => f.write_str(msg),
            BodyError::InvalidTrailer(e) => write!(f, "malformed trailer: {e}"),
        }
    }
}

impl From<io::Error> for BodyError {
    fn from(err: io::Error) -> Self {
        BodyError::Io(err)
    }
}

impl From<HeaderParseError> for BodyError {
    fn from(err: HeaderParseError) -> Self {
        BodyError::InvalidTrailer(err)
    }
}

// ===== Test =====
