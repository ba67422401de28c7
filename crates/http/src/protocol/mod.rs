//! Core HTTP protocol types.
//!
//! This module holds what a handler sees of an exchange and the types the
//! codecs pass around:
//!
//! - **Messages** ([`Message`], [`PayloadItem`], [`PayloadSize`]): a head or a
//!   piece of payload, and the framing of a body
//! - **Header fields** ([`Header`]): case-sensitive multi-valued map
//! - **Requests** ([`RequestHeader`], [`Request`], [`Body`]): the parsed head,
//!   the request with its lazily parsed query, cookies and form, and the body
//!   stream borrowed from the connection
//! - **Responses** ([`ResponseHead`], [`ResponseWriter`]): the status line and
//!   fields, and the buffered writer that picks the body framing
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`], [`MultipartError`],
//!   [`FormError`])
//!
//! Requests and responses borrow the connection they belong to, so neither can
//! outlive the exchange.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod header;
pub use header::Header;

mod body;
pub use body::Body;

mod request;
pub use request::Request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::ResponseWriter;

mod error;
pub use error::FormError;
pub use error::HttpError;
pub use error::MultipartError;
pub use error::ParseError;
pub use error::SendError;
