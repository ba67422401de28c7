//! HTTP codec module for encoding and decoding HTTP messages
//!
//! This module provides functionality for streaming HTTP message processing.
//! Request heads are read line by line through a [`BufferedReader`], bodies
//! are split out of the same buffer by the payload decoders, and responses
//! are serialized by the [`ResponseEncoder`].
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`BufferedReader`]: The connection's read buffer and line reader
//!   - Header parsing via [`read_request_header`] and [`read_header`]
//!   - Payload decoding via [`PayloadDecoder`]
//!
//! - Response handling:
//!   - [`ResponseEncoder`]: Encodes outgoing HTTP responses
//!   - Header encoding via [`HeaderEncoder`]
//!   - Payload encoding via [`PayloadEncoder`]
//!   - Content sniffing via [`detect_content_type`]
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_httpd::codec::ChunkedDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ChunkedDecoder::new();
//! let mut buffer = BytesMut::from(&b"5\r\nhello\r\n0\r\n\r\n"[..]);
//! let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(&chunk.into_bytes().unwrap()[..], b"hello");
//! ```

mod body;
mod buffered_reader;
mod header;
mod response_encoder;
mod sniff;

pub use body::{ChunkedDecoder, ChunkedEncoder, LengthDecoder, LengthEncoder, PayloadDecoder, PayloadEncoder};
pub use buffered_reader::BufferedReader;
pub(crate) use header::is_chunked;
pub use header::{read_header, read_request_header, HeaderEncoder};
pub use response_encoder::ResponseEncoder;
pub use sniff::detect_content_type;
