//! HTTP response handling implementation.
//!
//! [`ResponseWriter`] buffers what a handler writes and decides the framing of
//! the body the first time the buffer has to go out:
//!
//! - a `Content-Length` or `Transfer-Encoding: chunked` set by the handler is kept
//! - if the handler has already returned, the buffer is the whole body and its
//!   size becomes the `Content-Length`
//! - otherwise the body is sent chunked, one chunk per buffer flush

use std::io;

use bytes::BytesMut;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::detect_content_type;
use crate::connection::ConnWriter;
use crate::protocol::{Header, Message, PayloadItem, PayloadSize, SendError};

/// Status line and header fields of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub(crate) proto: String,
    pub(crate) status: StatusCode,
    pub(crate) header: Header,
}

impl ResponseHead {
    pub fn new(proto: impl Into<String>, status: StatusCode, header: Header) -> Self {
        Self { proto: proto.into(), status, header }
    }

    pub fn proto(&self) -> &str {
        &self.proto
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

/// Writes the response to one request.
///
/// Nothing reaches the socket before the buffer overflows, the handler calls
/// [`flush`](ResponseWriter::flush), or the handler returns. Until then the
/// status and header fields may still change.
pub struct ResponseWriter<'c> {
    conn: &'c Mutex<ConnWriter>,
    proto: String,
    status: StatusCode,
    header: Header,
    buffer: BytesMut,
    capacity: usize,

    wrote_header: bool,
    header_sent: bool,
    handler_done: bool,
    close_after_reply: bool,
}

impl<'c> ResponseWriter<'c> {
    pub(crate) fn new(conn: &'c Mutex<ConnWriter>, proto: impl Into<String>, close_after_reply: bool, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            conn,
            proto: proto.into(),
            status: StatusCode::OK,
            header: Header::new(),
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            wrote_header: false,
            header_sent: false,
            handler_done: false,
            close_after_reply,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Header fields of the response, changes after the head went out are ignored.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code. Only the first call before any body byte counts.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.wrote_header {
            debug!(%status, "status already written, ignored");
            return;
        }
        self.status = status;
        self.wrote_header = true;
    }

    /// True if the connection will be closed after this response.
    pub fn close_after_reply(&self) -> bool {
        self.close_after_reply
    }

    /// Appends `data` to the body. A failed write dooms the connection.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, SendError> {
        self.wrote_header = true;
        let result = self.buffered_write(data).await;
        if result.is_err() {
            self.close_after_reply = true;
        }
        result.map(|()| data.len())
    }

    pub async fn write_str(&mut self, data: &str) -> Result<usize, SendError> {
        self.write(data.as_bytes()).await
    }

    /// Streams `reader` into the body until it is exhausted.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0; self.capacity];
        let mut copied = 0;
        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                return Ok(copied);
            }
            self.write(&buf[..read]).await?;
            copied += read as u64;
        }
    }

    /// Sends the head and everything buffered so far.
    ///
    /// Flushing before the handler returns commits the response to chunked
    /// framing unless the handler set a `Content-Length`.
    pub async fn flush(&mut self) -> Result<(), SendError> {
        let result = async {
            self.flush_buffer().await?;
            self.conn.lock().await.flush().await
        }
        .await;
        if result.is_err() {
            self.close_after_reply = true;
        }
        result
    }

    async fn buffered_write(&mut self, mut data: &[u8]) -> Result<(), SendError> {
        while data.len() > self.capacity - self.buffer.len() {
            let (head, tail) = data.split_at(self.capacity - self.buffer.len());
            self.buffer.extend_from_slice(head);
            data = tail;
            self.flush_buffer().await?;
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Moves the buffer to the connection, preceded by the head on first use.
    async fn flush_buffer(&mut self) -> Result<(), SendError> {
        let conn = self.conn;
        let mut conn = conn.lock().await;

        if !self.header_sent {
            let payload_size = self.finalize_header();
            let head = ResponseHead::new(self.proto.clone(), self.status, self.header.clone());
            self.header_sent = true;
            conn.write(Message::<_, &[u8]>::Header((head, payload_size))).await?;
        }

        if !self.buffer.is_empty() {
            conn.write(Message::Payload(PayloadItem::Chunk(&self.buffer[..]))).await?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Fills in the fields the handler left out and picks the body framing.
    fn finalize_header(&mut self) -> PayloadSize {
        if !self.buffer.is_empty() && self.header.get_ignore_ascii_case("Content-Type").is_none() {
            self.header.set("Content-Type", detect_content_type(&self.buffer).to_string());
        }

        let asked_close = self
            .header
            .get_ignore_ascii_case("Connection")
            .is_some_and(|value| value.split(',').any(|token| token.trim().eq_ignore_ascii_case("close")));
        if asked_close {
            self.close_after_reply = true;
        } else if self.close_after_reply && self.proto == "HTTP/1.1" {
            self.header.set("Connection", "close");
        }

        if crate::codec::is_chunked(self.header.get_ignore_ascii_case("Transfer-Encoding")) {
            return PayloadSize::Chunked;
        }
        if let Some(length) = self.header.get_ignore_ascii_case("Content-Length") {
            match length.trim().parse::<u64>() {
                Ok(length) => return PayloadSize::Length(length),
                Err(_) => warn!(length, "ignore invalid content-length set by handler"),
            }
        }

        match (self.handler_done, self.buffer.len()) {
            (true, 0) => PayloadSize::Empty,
            (true, len) => PayloadSize::Length(len as u64),
            (false, _) => PayloadSize::Chunked,
        }
    }

    /// Completes the response after the handler returned: sends the head if it
    /// is still pending, the rest of the body and its terminator, then flushes
    /// the socket. A body shorter than its `Content-Length` is an error.
    pub(crate) async fn finish(&mut self) -> Result<(), SendError> {
        self.handler_done = true;
        let result = async {
            self.flush_buffer().await?;
            let mut conn = self.conn.lock().await;
            let eof = conn.write(Message::Payload(PayloadItem::<&[u8]>::Eof)).await;
            conn.flush().await?;
            eof
        }
        .await;
        if result.is_err() {
            self.close_after_reply = true;
        }
        result
    }
}

impl std::fmt::Debug for ResponseWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("proto", &self.proto)
            .field("status", &self.status)
            .field("header", &self.header)
            .field("buffered", &self.buffer.len())
            .field("header_sent", &self.header_sent)
            .field("close_after_reply", &self.close_after_reply)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ChunkedDecoder;
    use crate::connection::test_util::conn_writer;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio_util::codec::Decoder;

    async fn sent(conn: &Mutex<ConnWriter>, mut client: DuplexStream) -> String {
        conn.lock().await.shutdown().await.unwrap();
        let mut sent = Vec::new();
        client.read_to_end(&mut sent).await.unwrap();
        String::from_utf8(sent).unwrap()
    }

    #[tokio::test]
    async fn small_body_gets_content_length() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4096);

        writer.write_str("Hello ").await.unwrap();
        writer.write_str("World!").await.unwrap();
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        assert!(sent.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(sent.contains("Content-Length: 12\r\n"));
        assert!(sent.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(!sent.contains("Transfer-Encoding"));
        assert!(sent.ends_with("\r\n\r\nHello World!"));
    }

    #[tokio::test]
    async fn large_body_is_chunked() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 16);

        let mut expected = Vec::new();
        for i in 0..10 {
            let piece = format!("piece number {i};");
            expected.extend_from_slice(piece.as_bytes());
            writer.write_str(&piece).await.unwrap();
        }
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        let (head, body) = sent.split_once("\r\n\r\n").unwrap();
        assert!(head.contains("Transfer-Encoding: chunked"));
        assert!(!head.contains("Content-Length"));

        let mut buffer = BytesMut::from(body.as_bytes());
        let mut decoder = ChunkedDecoder::new();
        let mut decoded = Vec::new();
        loop {
            match decoder.decode(&mut buffer).unwrap().unwrap() {
                PayloadItem::Chunk(bytes) => decoded.extend_from_slice(&bytes),
                PayloadItem::Eof => break,
            }
        }
        assert_eq!(decoded, expected);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn status_is_set_once() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4096);

        writer.write_header(StatusCode::NOT_FOUND);
        writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        assert_eq!(sent, "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn status_after_body_is_ignored() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.0", true, 4096);

        writer.write_str("<html></html>").await.unwrap();
        writer.write_header(StatusCode::CREATED);
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        assert!(sent.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(sent.contains("Content-Type: text/html; charset=utf-8\r\n"));
        // an HTTP/1.0 client expects the close anyway
        assert!(!sent.contains("Connection"));
    }

    #[tokio::test]
    async fn explicit_content_length_is_kept() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4);

        writer.header_mut().set("Content-Length", "10");
        writer.header_mut().set("Content-Type", "application/octet-stream");
        writer.write(b"0123456789").await.unwrap();
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        assert!(sent.contains("Content-Length: 10\r\n"));
        assert!(sent.ends_with("\r\n\r\n0123456789"));
    }

    #[tokio::test]
    async fn content_length_mismatch_forces_close() {
        let (conn, _client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4096);
        writer.header_mut().set("Content-Length", "3");
        writer.write(b"too long").await.unwrap();
        assert!(writer.finish().await.is_err());
        assert!(writer.close_after_reply());

        let (conn, _client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4096);
        writer.header_mut().set("Content-Length", "30");
        writer.write(b"too short").await.unwrap();
        assert!(writer.finish().await.is_err());
        assert!(writer.close_after_reply());
    }

    #[tokio::test]
    async fn close_is_announced_to_http11_peer() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", true, 4096);
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        assert!(sent.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn handler_asking_close_closes() {
        let (conn, _client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4096);
        writer.header_mut().set("Connection", "close");
        writer.finish().await.unwrap();

        assert!(writer.close_after_reply());
    }

    #[tokio::test]
    async fn early_flush_commits_to_chunked() {
        let (conn, client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 4096);

        writer.write_str("first").await.unwrap();
        writer.flush().await.unwrap();
        writer.write_str("second").await.unwrap();
        writer.finish().await.unwrap();

        let sent = sent(&conn, client).await;
        assert!(sent.contains("Transfer-Encoding: chunked\r\n"));
        assert!(sent.ends_with("\r\n\r\n5\r\nfirst\r\n6\r\nsecond\r\n0\r\n\r\n"));
    }
}
