//! Buffered reading over a raw byte stream.
//!
//! [`BufferedReader`] is the single read buffer of a connection (and of a
//! multipart reader). It hands out logical lines for the request head, and it
//! exposes its buffer to the payload decoders, which split body bytes out of it
//! without copying.

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncRead;
use tracing::trace;

use crate::protocol::ParseError;

/// Smallest read we issue into the buffer
const MIN_READ_SIZE: usize = 64;

/// A read buffer in front of an [`AsyncRead`].
///
/// `capacity` is the largest single line fragment the reader keeps in memory:
/// a line longer than that is handed out in fragments which [`read_line`]
/// reassembles before anyone inspects it.
///
/// [`read_line`]: BufferedReader::read_line
#[derive(Debug)]
pub struct BufferedReader<R> {
    inner: R,
    buf: BytesMut,
    capacity: usize,
}

impl<R> BufferedReader<R> {
    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        Self { inner, buf: BytesMut::with_capacity(capacity), capacity }
    }

    #[inline]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Bytes read from the stream but not consumed yet.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<R: AsyncRead + Unpin> BufferedReader<R> {
    /// Reads more bytes from the stream into the buffer.
    ///
    /// Resolves to the number of bytes appended, `0` meaning end of stream.
    pub fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let wanted = self.capacity.saturating_sub(self.buf.len()).max(MIN_READ_SIZE);
        self.buf.reserve(wanted);
        tokio_util::io::poll_read_buf(Pin::new(&mut self.inner), cx, &mut self.buf)
    }

    pub async fn fill(&mut self) -> io::Result<usize> {
        poll_fn(|cx| self.poll_fill(cx)).await
    }

    /// Reads exactly `n` bytes, failing with `UnexpectedEof` if the stream ends first.
    pub async fn read_exact_bytes(&mut self, n: usize) -> io::Result<Bytes> {
        while self.buf.len() < n {
            if self.fill().await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Reads one logical line, without its `\n` or `\r\n` terminator.
    ///
    /// End of stream before the first byte of the line is reported as
    /// [`ParseError::ConnectionClosed`], end of stream inside a line as an
    /// `UnexpectedEof` I/O error.
    pub async fn read_line(&mut self) -> Result<BytesMut, ParseError> {
        self.read_line_until_eof(false).await
    }

    /// Like [`read_line`] but an unterminated line at the end of the stream is
    /// returned as is.
    ///
    /// [`read_line`]: BufferedReader::read_line
    pub async fn read_last_line(&mut self) -> Result<BytesMut, ParseError> {
        self.read_line_until_eof(true).await
    }

    async fn read_line_until_eof(&mut self, accept_unterminated: bool) -> Result<BytesMut, ParseError> {
        let mut line = BytesMut::new();
        let mut searched = 0;

        loop {
            if let Some(offset) = self.buf[searched..].iter().position(|b| *b == b'\n') {
                let end = searched + offset;
                let mut fragment = self.buf.split_to(end + 1);
                fragment.truncate(end);

                if line.is_empty() {
                    line = fragment;
                } else {
                    line.extend_from_slice(&fragment);
                }

                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(line);
            }

            if self.buf.len() >= self.capacity {
                // line is longer than the buffer: move the fragment out, but keep a
                // trailing CR so that it can still pair with the next LF
                let keep = usize::from(self.buf.ends_with(b"\r"));
                let fragment = self.buf.split_to(self.buf.len() - keep);
                trace!(len = fragment.len(), "read line fragment");
                line.extend_from_slice(&fragment);
            }
            searched = self.buf.len();

            if self.fill().await? == 0 {
                if line.is_empty() && self.buf.is_empty() {
                    return Err(ParseError::ConnectionClosed);
                }
                if !accept_unterminated {
                    return Err(ParseError::io(io::ErrorKind::UnexpectedEof));
                }
                line.extend_from_slice(&self.buf.split());
                return Ok(line);
            }
        }
    }
}
