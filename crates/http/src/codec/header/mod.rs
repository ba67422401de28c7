//! HTTP header processing module for reading request heads and writing response heads
//!
//! # Components
//!
//! - [`read_request_header`]: Reads a request line and header block from a
//!   [`BufferedReader`](crate::codec::BufferedReader)
//!   - Validates the request line and version
//!   - Resolves the body framing from `Transfer-Encoding` and `Content-Length`
//!
//! - [`read_header`]: Reads a bare header block, also used for multipart parts
//!
//! - [`HeaderEncoder`]: Encodes response heads to bytes
//!   - Writes the status line with the canonical reason phrase
//!   - Manages content-length and transfer-encoding headers

mod header_decoder;
mod header_encoder;

pub(crate) use header_decoder::is_chunked;
pub use header_decoder::{read_header, read_request_header};
pub use header_encoder::HeaderEncoder;
