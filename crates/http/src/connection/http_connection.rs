use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::codec::{read_request_header, BufferedReader};
use crate::connection::{BoxedRead, BoxedWrite, ConnReader, ConnWriter, ConnectionConfig, MessageWriter};
use crate::handler::Handler;
use crate::protocol::{
    Body, Header, HttpError, Message, ParseError, PayloadItem, PayloadSize, Request, ResponseHead, ResponseWriter,
};

/// An HTTP connection that serves requests one after the other until one of
/// them asks for the connection to close
///
/// `HttpConnection` handles the full lifecycle of a connection, including:
/// - Reading request heads under a byte quota
/// - Handing each request to the handler together with its response writer
/// - Discarding the part of a request body the handler did not read
/// - Handling the expect-continue mechanism
/// - Containing a panicking handler to its own connection
pub struct HttpConnection {
    reader: ConnReader,
    writer: Mutex<ConnWriter>,
    config: ConnectionConfig,
    remote_addr: Option<SocketAddr>,
}

impl HttpConnection {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Self::with_config(reader, writer, ConnectionConfig::default())
    }

    pub fn with_config<R, W>(reader: R, writer: W, config: ConnectionConfig) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Sync + Unpin + 'static,
    {
        let reader: BoxedRead = Box::new(reader);
        let writer: BoxedWrite = Box::new(writer);
        Self {
            reader: BufferedReader::with_capacity(reader.take(config.header_read_limit), config.read_buffer_size),
            writer: Mutex::new(MessageWriter::with_capacity(writer, config.write_buffer_size)),
            config,
            remote_addr: None,
        }
    }

    /// Address of the peer, reported by [`Request::remote_addr`].
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Serves requests until the peer closes, a response asks for close, or an
    /// error makes the stream unusable. The socket is shut down in every case.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
    {
        let result = loop {
            match self.serve_one(&*handler).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.writer.get_mut().shutdown().await {
            debug!(cause = %e, "shutdown connection failed");
        }
        result
    }

    /// Serves a single request, resolving to whether the connection stays open.
    async fn serve_one<H>(&mut self, handler: &H) -> Result<bool, HttpError>
    where
        H: Handler + ?Sized,
    {
        // every request head gets a fresh quota
        self.reader.get_mut().set_limit(self.config.header_read_limit);

        let (header, payload_size) = match read_request_header(&mut self.reader).await {
            Ok(parsed) => parsed,
            Err(e) => {
                let e = if self.reader.get_ref().limit() == 0 {
                    ParseError::too_large_header(self.config.header_read_limit)
                } else {
                    e
                };
                if e.is_closed() {
                    debug!("peer closed connection");
                    return Ok(false);
                }
                error!(cause = %e, "can't receive next request");
                self.send_bad_request().await;
                return Err(e.into());
            }
        };
        // the body is bounded by its own framing
        self.reader.get_mut().set_limit(u64::MAX);

        let Self { reader, writer, config, remote_addr } = self;
        let writer = &*writer;

        let keep_alive_refused = header.wants_close();
        let proto = header.proto().to_string();
        let mut body = Body::new(payload_size, reader);
        if header.expects_continue() {
            body = body.expect_continue(writer);
        }
        let mut request = Request::new(header, body, *remote_addr, config.form_limits.clone());
        let mut response = ResponseWriter::new(writer, proto, keep_alive_refused, config.write_buffer_size);

        let served = AssertUnwindSafe(handler.serve_http(&mut response, &mut request)).catch_unwind().await;
        if let Err(panic) = served {
            let message = panic_message(&*panic);
            error!(%message, path = request.path(), "handler panicked, close connection");
            request.discard_form().await;
            return Err(HttpError::handler_panic(message));
        }

        if let Err(e) = response.finish().await {
            request.discard_form().await;
            return Err(e.into());
        }

        if request.body().is_continue_pending() {
            // the client never got its 100 Continue, so whether the body follows is unknown
            debug!("request body was never asked for, close connection");
            request.discard_form().await;
            return Ok(false);
        }

        if let Err(e) = request.finish().await {
            debug!(cause = %e, "can't discard rest of request body, close connection");
            return Ok(false);
        }

        Ok(!response.close_after_reply())
    }

    /// Best-effort `400 Bad Request` before giving up on the connection.
    async fn send_bad_request(&mut self) {
        let mut header = Header::new();
        header.set("Connection", "close");
        let head = ResponseHead::new("HTTP/1.1", StatusCode::BAD_REQUEST, header);

        let writer = self.writer.get_mut();
        if !writer.is_idle() {
            return;
        }
        let sent = async {
            writer.write(Message::<_, &[u8]>::Header((head, PayloadSize::Empty))).await?;
            writer.write(Message::Payload(PayloadItem::<&[u8]>::Eof)).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = sent {
            debug!(cause = %e, "can't send bad request response");
        }
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("config", &self.config)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::FormLimits;
    use async_trait::async_trait;
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
            if request.path() == "/panic" {
                panic!("boom");
            }
            if request.path() == "/upload" {
                let file = request.form_file("up").await.unwrap();
                let path = file.path().unwrap();
                assert!(path.exists());
                let path = path.display().to_string();
                writer.write_str(&path).await.unwrap();
                return;
            }
            if request.path() == "/ignore" {
                writer.write_str("ignored").await.unwrap();
                return;
            }
            let mut body = Vec::new();
            request.body_mut().read_to_end(&mut body).await.unwrap();
            writer.write_str(request.path()).await.unwrap();
            writer.write(b":").await.unwrap();
            writer.write(&body).await.unwrap();
        }
    }

    /// Runs a connection over an in-memory pipe, feeding it `input` and
    /// collecting everything it answers until it closes.
    async fn exchange(input: &[u8], config: ConnectionConfig) -> (Result<(), HttpError>, String) {
        let (client, server) = tokio::io::duplex(1 << 20);
        let (server_read, server_write) = tokio::io::split(server);
        let connection = HttpConnection::with_config(server_read, server_write, config);
        let task = tokio::spawn(connection.process(Arc::new(Echo)));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(input).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        (task.await.unwrap(), String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let input = indoc! {"
            POST /a HTTP/1.1\r
            Content-Length: 5\r
            \r
            helloGET /b HTTP/1.1\r
            \r
        "};
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(output.contains("\r\n\r\n/a:hello"));
        assert!(output.ends_with("\r\n\r\n/b:"));
    }

    #[tokio::test]
    async fn unread_body_is_discarded() {
        let input = indoc! {"
            POST /ignore HTTP/1.1\r
            Transfer-Encoding: chunked\r
            \r
            4\r
            Wiki\r
            0\r
            \r
            GET /next HTTP/1.1\r
            \r
        "};
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert!(output.contains("\r\n\r\nignored"));
        assert!(output.ends_with("\r\n\r\n/next:"));
    }

    #[tokio::test]
    async fn connection_close_stops_the_loop() {
        let input = "GET /a HTTP/1.1\r\nConnection: close\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert!(output.contains("Connection: close\r\n"));
        assert!(!output.contains("/b"));
    }

    #[tokio::test]
    async fn http10_closes_after_reply() {
        let input = "GET /a HTTP/1.0\r\n\r\nGET /b HTTP/1.0\r\n\r\n";
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert!(output.starts_with("HTTP/1.0 200 OK\r\n"));
        assert_eq!(output.matches("HTTP/1.0").count(), 1);
    }

    #[tokio::test]
    async fn garbage_gets_bad_request() {
        let (result, output) = exchange(b"NOT A REQUEST LINE AT ALL\r\n\r\n", ConnectionConfig::default()).await;

        assert!(matches!(result, Err(HttpError::RequestError { .. })));
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn header_quota_is_enforced() {
        let config = ConnectionConfig { header_read_limit: 64, ..ConnectionConfig::default() };
        let input = format!("GET / HTTP/1.1\r\nX-Long: {}\r\n\r\n", "a".repeat(200));
        let (result, output) = exchange(input.as_bytes(), config).await;

        assert!(matches!(
            result,
            Err(HttpError::RequestError { source: ParseError::TooLargeHeader { max_size: 64 } })
        ));
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn quota_is_rearmed_per_request() {
        let config = ConnectionConfig { header_read_limit: 256, ..ConnectionConfig::default() };
        let request = "GET /x HTTP/1.1\r\nX-Pad: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        let input = request.repeat(10);
        let (result, output) = exchange(input.as_bytes(), config).await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 10);
    }

    #[tokio::test]
    async fn spilled_upload_is_removed_after_exchange() {
        let dir = std::env::temp_dir().join(format!("micro-httpd-conn-spill-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let content = "0123456789".repeat(100);
        let body = format!("--b\r\nContent-Disposition: form-data; name=\"up\"; filename=\"big.bin\"\r\n\r\n{content}\r\n--b--\r\n");
        let input = format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=b\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let form_limits = FormLimits { max_file_memory: 10, temp_dir: Some(dir.clone()), ..FormLimits::default() };
        let config = ConnectionConfig { form_limits, ..ConnectionConfig::default() };
        let (result, output) = exchange(input.as_bytes(), config).await;

        assert!(result.is_ok());
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        let (_, path) = output.split_once("\r\n\r\n").unwrap();
        assert!(std::path::Path::new(path).starts_with(&dir));
        assert!(!std::path::Path::new(path).exists());

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn panic_closes_only_this_connection() {
        let (result, output) = exchange(b"GET /panic HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n", ConnectionConfig::default()).await;

        assert!(matches!(result, Err(HttpError::HandlerPanic { ref message }) if message == "boom"));
        assert!(output.is_empty());

        // the runtime and other connections carry on
        let (result, output) = exchange(b"GET /ok HTTP/1.1\r\n\r\n", ConnectionConfig::default()).await;
        assert!(result.is_ok());
        assert!(output.ends_with("/ok:"));
    }

    #[tokio::test]
    async fn expect_continue_is_sent_on_first_read() {
        let input = "POST /up HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 3\r\n\r\nabc";
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert!(output.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("/up:abc"));
    }

    #[tokio::test]
    async fn expect_continue_unread_closes() {
        let input = "POST /ignore HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\n\r\n";
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert!(!output.contains("100 Continue"));
        assert!(output.ends_with("ignored"));
        assert!(!output.contains("/b"));
    }

    #[tokio::test]
    async fn truncated_body_closes_connection() {
        let input = "POST /ignore HTTP/1.1\r\nContent-Length: 30\r\n\r\nshort";
        let (result, output) = exchange(input.as_bytes(), ConnectionConfig::default()).await;

        assert!(result.is_ok());
        assert!(output.ends_with("ignored"));
    }
}
