//! Streaming access to a request body.
//!
//! [`Body`] decodes the payload straight out of the connection's read buffer,
//! so nothing is read from the socket unless the handler (or the connection,
//! when it drains what the handler left) asks for it.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Mutex;
use tokio_util::codec::Decoder;
use tracing::{info, trace};

use crate::codec::PayloadDecoder;
use crate::connection::{ConnReader, ConnWriter};
use crate::protocol::{PayloadItem, PayloadSize};

const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// The body of one request, readable through [`AsyncRead`].
///
/// A request without a body (any method but POST and PUT, or no framing
/// header) reads as empty. A framing error in the payload is reported as
/// [`io::ErrorKind::InvalidData`], a peer closing mid-body as
/// [`io::ErrorKind::UnexpectedEof`].
pub struct Body<'c> {
    decoder: PayloadDecoder,
    reader: &'c mut ConnReader,
    pending: Bytes,
    eof: bool,
    failed: bool,
    expect_continue: ContinueState<'c>,
}

#[derive(Clone, Copy)]
enum ContinueState<'c> {
    /// no interim response was asked for
    None,
    /// sent on the first read
    Pending(&'c Mutex<ConnWriter>),
    /// queued on the writer, waiting for the socket
    Flushing(&'c Mutex<ConnWriter>),
    Done,
}

impl<'c> Body<'c> {
    pub(crate) fn new(payload_size: PayloadSize, reader: &'c mut ConnReader) -> Self {
        Self {
            decoder: PayloadDecoder::from(payload_size),
            reader,
            pending: Bytes::new(),
            eof: false,
            failed: false,
            expect_continue: ContinueState::None,
        }
    }

    /// Arms a `100 Continue` interim response, written before the first byte of
    /// the body is read.
    pub(crate) fn expect_continue(mut self, writer: &'c Mutex<ConnWriter>) -> Self {
        if !self.decoder.is_empty() {
            self.expect_continue = ContinueState::Pending(writer);
        }
        self
    }

    /// True once the whole body has been read.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// True if reading failed; the rest of the connection can not be trusted.
    pub(crate) fn is_failed(&self) -> bool {
        self.failed
    }

    /// True if the client waits for `100 Continue` that was never sent, so it may
    /// or may not transmit the body.
    pub(crate) fn is_continue_pending(&self) -> bool {
        matches!(self.expect_continue, ContinueState::Pending(_))
    }

    /// Reads and discards whatever the handler left of the body.
    pub async fn drain(&mut self) -> io::Result<u64> {
        let drained = tokio::io::copy(self, &mut tokio::io::sink()).await?;
        if drained > 0 {
            trace!(drained, "discarded unread request body");
        }
        Ok(drained)
    }

    fn poll_continue(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let (writer, queued) = match self.expect_continue {
            ContinueState::None | ContinueState::Done => return Poll::Ready(Ok(())),
            ContinueState::Pending(writer) => (writer, false),
            ContinueState::Flushing(writer) => (writer, true),
        };

        let Ok(mut writer_guard) = writer.try_lock() else {
            // the response writer is mid-flush in the same task
            cx.waker().wake_by_ref();
            return Poll::Pending;
        };

        if !queued {
            // a response already under way makes an interim response meaningless
            if !writer_guard.is_idle() {
                self.expect_continue = ContinueState::Done;
                return Poll::Ready(Ok(()));
            }
            writer_guard.write_raw(CONTINUE_RESPONSE);
            self.expect_continue = ContinueState::Flushing(writer);
        }

        let result = ready!(writer_guard.poll_flush(cx));
        self.expect_continue = ContinueState::Done;
        if result.is_ok() {
            info!("receive expect request header, sent continue response");
        }
        Poll::Ready(result)
    }

    fn poll_body(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            if !self.pending.is_empty() {
                let len = self.pending.len().min(buf.remaining());
                buf.put_slice(&self.pending.split_to(len));
                return Poll::Ready(Ok(()));
            }

            if self.eof {
                return Poll::Ready(Ok(()));
            }

            match self.decoder.decode(self.reader.buffer_mut())? {
                Some(PayloadItem::Chunk(bytes)) => self.pending = bytes,
                Some(PayloadItem::Eof) => self.eof = true,
                None => {
                    if ready!(self.reader.poll_fill(cx))? == 0 {
                        return Poll::Ready(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "request body truncated")));
                    }
                }
            }
        }
    }
}

impl AsyncRead for Body<'_> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.failed {
            return Poll::Ready(Err(io::Error::other("request body already failed")));
        }

        let result = match this.poll_continue(cx) {
            Poll::Ready(Ok(())) => this.poll_body(cx, buf),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        };

        if let Poll::Ready(Err(_)) = &result {
            this.failed = true;
        }
        result
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("decoder", &self.decoder)
            .field("pending", &self.pending.len())
            .field("eof", &self.eof)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_util::{conn_reader, conn_writer};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn length_body_stops_at_length() {
        let mut reader = conn_reader(b"hello worldGET / HTTP/1.1\r\n");
        let mut body = Body::new(PayloadSize::Length(11), &mut reader);

        let mut data = Vec::new();
        body.read_to_end(&mut data).await.unwrap();
        assert_eq!(&data[..], b"hello world");
        assert!(body.is_eof());

        // reading further returns nothing
        assert_eq!(body.read(&mut [0; 8]).await.unwrap(), 0);
        drop(body);
        assert_eq!(reader.buffer(), b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn chunked_body_is_decoded() {
        let mut reader = conn_reader(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        let mut body = Body::new(PayloadSize::Chunked, &mut reader);

        let mut data = String::new();
        body.read_to_string(&mut data).await.unwrap();
        assert_eq!(data, "Wikipedia");
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let mut reader = conn_reader(b"short");
        let mut body = Body::new(PayloadSize::Length(10), &mut reader);

        let err = body.read_to_end(&mut Vec::new()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(body.is_failed());
    }

    #[tokio::test]
    async fn malformed_chunk_is_invalid_data() {
        let mut reader = conn_reader(b"zz\r\nabc\r\n");
        let mut body = Body::new(PayloadSize::Chunked, &mut reader);

        let err = body.drain().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn empty_body_reads_nothing() {
        let mut reader = conn_reader(b"GET / HTTP/1.1\r\n");
        let mut body = Body::new(PayloadSize::Empty, &mut reader);

        assert_eq!(body.drain().await.unwrap(), 0);
        drop(body);
        assert_eq!(reader.buffer().len(), 0);
    }

    #[tokio::test]
    async fn continue_is_sent_once_before_first_read() {
        let (writer, mut client) = conn_writer();
        let mut reader = conn_reader(b"abc");
        let mut body = Body::new(PayloadSize::Length(3), &mut reader).expect_continue(&writer);
        assert!(body.is_continue_pending());

        let mut data = Vec::new();
        body.read_to_end(&mut data).await.unwrap();
        assert_eq!(&data[..], b"abc");
        assert!(!body.is_continue_pending());
        drop(body);

        writer.lock().await.shutdown().await.unwrap();
        drop(writer);
        let mut sent = Vec::new();
        client.read_to_end(&mut sent).await.unwrap();
        assert_eq!(&sent[..], CONTINUE_RESPONSE);
    }

    #[tokio::test]
    async fn no_continue_without_body() {
        let (writer, _client) = conn_writer();
        let mut reader = conn_reader(b"");
        let body = Body::new(PayloadSize::Empty, &mut reader).expect_continue(&writer);

        assert!(!body.is_continue_pending());
    }
}
