//! HTTP connection handling module
//!
//! This module drives one client connection from the first request line to
//! the close of the socket.
//!
//! # Components
//!
//! - [`HttpConnection`]: the per-connection loop that:
//!   - reads request heads under a byte quota
//!   - hands each request and its response writer to a [`Handler`](crate::handler::Handler)
//!   - drains unread bodies so the next request starts at its first byte
//!   - decides between keep-alive and close
//!   - contains handler panics to the connection they happened on
//! - [`MessageWriter`]: the buffered write half shared by the response writer
//!   and the `100 Continue` interim response
//! - [`ConnectionConfig`] and [`FormLimits`]: buffer sizes, the header quota
//!   and the multipart memory budgets

mod config;
mod http_connection;
mod message_writer;

pub use config::{
    ConnectionConfig, FormLimits, DEFAULT_HEADER_READ_LIMIT, DEFAULT_MAX_FILE_MEMORY, DEFAULT_MAX_VALUE_MEMORY,
    DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_BUFFER_SIZE,
};
pub use http_connection::HttpConnection;
pub use message_writer::MessageWriter;

use tokio::io::{AsyncRead, AsyncWrite, Take};

use crate::codec::BufferedReader;

pub(crate) type BoxedRead = Box<dyn AsyncRead + Send + Sync + Unpin>;
pub(crate) type BoxedWrite = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Read side of a connection, the `Take` enforces the header quota.
pub(crate) type ConnReader = BufferedReader<Take<BoxedRead>>;
pub(crate) type ConnWriter = MessageWriter<BoxedWrite>;
