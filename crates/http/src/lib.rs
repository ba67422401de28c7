//! A micro HTTP/1.1 server engine working on raw byte streams
//!
//! This crate parses HTTP/1.1 requests straight off a TCP stream, hands them
//! to a handler together with a buffered response writer, and keeps the
//! connection alive between requests. It is built on tokio and does its own
//! request-line, header and body framing.
//!
//! # Features
//!
//! - Request heads read line by line under a per-request byte quota
//! - `Content-Length` and chunked request bodies, streamed on demand
//! - `Expect: 100-continue`, answered only when the handler reads the body
//! - Lazily parsed query strings, cookies, urlencoded and multipart forms
//! - Multipart uploads kept in memory up to a budget, then spilled to temp files
//! - Responses framed by `Content-Length` when they fit the write buffer,
//!   chunked otherwise
//! - Keep-alive with HTTP/1.0 and `Connection: close` handling
//! - Handler panics contained to their own connection
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use http::StatusCode;
//! use micro_httpd::handler::Handler;
//! use micro_httpd::protocol::{Request, ResponseWriter};
//! use micro_httpd::router::Router;
//! use micro_httpd::server::Server;
//!
//! struct HelloWorld;
//!
//! #[async_trait]
//! impl Handler for HelloWorld {
//!     async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
//!         let name = request.query("name").unwrap_or("World").to_string();
//!         writer.write_header(StatusCode::OK);
//!         let _ = writer.write_str(&format!("Hello {name}!\r\n")).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.handle("/hello", HelloWorld);
//!
//!     let server = Server::builder().address("127.0.0.1:8080").unwrap().handler(router).build().unwrap();
//!     server.start().await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`codec`]: line reading, header decoding and encoding, payload framing
//! - [`protocol`]: header map, request, body, response writer, errors
//! - [`multipart`]: streaming multipart reader and form materializer
//! - [`connection`]: the per-connection request loop and its configuration
//! - [`handler`]: the [`Handler`](handler::Handler) trait
//! - [`router`]: exact-path routing and the default router
//! - [`server`]: the TCP accept loop
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: outcome of a whole connection
//! - [`protocol::ParseError`]: malformed or truncated requests
//! - [`protocol::SendError`]: failures writing a response
//! - [`protocol::MultipartError`] and [`protocol::FormError`]: multipart framing
//!   and form parsing
//!
//! # Limitations
//!
//! - HTTP/1.1 and HTTP/1.0 only, no TLS
//! - No chunk extensions or trailers
//! - No request or idle timeouts

pub mod codec;
pub mod connection;
pub mod handler;
pub mod multipart;
pub mod protocol;
pub mod router;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
