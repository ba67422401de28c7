use crate::codec::ResponseEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

/// The write half of a connection: encodes response messages into a buffer and
/// moves the buffer to the socket whenever it reaches its capacity or on
/// [`flush`](MessageWriter::flush).
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
    capacity: usize,
    encoder: ResponseEncoder,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), capacity: buffer_size, encoder: ResponseEncoder::new() }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// True when no response is half written, so an interim response may go out.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.encoder.is_idle()
    }

    pub async fn write<D>(&mut self, item: Message<(ResponseHead, PayloadSize), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.encoder.encode(item, &mut self.buffer)?;
        if self.buffer.len() >= self.capacity {
            self.write_buffered().await?;
        }
        Ok(())
    }

    /// Queues bytes that bypass the response encoder, such as an interim status line.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        Ok(poll_fn(|cx| self.poll_flush(cx)).await?)
    }

    /// Writes out the buffer and flushes the socket.
    pub fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.poll_write_buffered(cx))?;
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        self.flush().await?;
        Ok(self.writer.shutdown().await?)
    }

    async fn write_buffered(&mut self) -> Result<(), SendError> {
        Ok(poll_fn(|cx| self.poll_write_buffered(cx)).await?)
    }

    fn poll_write_buffered(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.buffer.is_empty() {
            let written = ready!(Pin::new(&mut self.writer).poll_write(cx, &self.buffer))?;
            if written == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            trace!(written, "write buffered response bytes");
            self.buffer.advance(written);
        }
        Poll::Ready(Ok(()))
    }
}
