//! HTTP header encoder implementation for serializing HTTP response headers
//!
//! This module encodes a response status line and header block into raw bytes.
//! It also writes the `Content-Length` or `Transfer-Encoding` field matching the
//! framing chosen for the body.

use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Encoder for HTTP response heads implementing the [`Encoder`] trait.
///
/// The status line echoes the protocol of the request being answered, the
/// reason phrase is the canonical one of the status code.
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        write!(
            FastWrite(dst),
            "{} {} {}\r\n",
            head.proto,
            head.status.as_str(),
            head.status.canonical_reason().unwrap_or("")
        )?;

        // Set appropriate content length or transfer encoding header, dropping any
        // differently spelled framing field the handler may have set
        head.header.retain(|name| !name.eq_ignore_ascii_case("Content-Length") && !name.eq_ignore_ascii_case("Transfer-Encoding"));
        match payload_size {
            PayloadSize::Length(n) => head.header.set("Content-Length", n.to_string()),
            PayloadSize::Chunked => head.header.set("Transfer-Encoding", "chunked"),
            PayloadSize::Empty => head.header.set("Content-Length", "0"),
        }

        // Write all headers, one line per value
        for (name, values) in &head.header {
            for value in values {
                dst.put_slice(name.as_bytes());
                dst.put_slice(b": ");
                dst.put_slice(value.as_bytes());
                dst.put_slice(b"\r\n");
            }
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writer that appends straight into a `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;
    use http::StatusCode;

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn status_line_echoes_protocol() {
        let head = ResponseHead::new("HTTP/1.0", StatusCode::NOT_FOUND, Header::new());
        let encoded = encode(head, PayloadSize::Empty);

        assert_eq!(encoded, "HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn framing_field_follows_payload_size() {
        let mut header = Header::new();
        header.set("Content-Type", "text/plain");
        let encoded = encode(ResponseHead::new("HTTP/1.1", StatusCode::OK, header.clone()), PayloadSize::Chunked);

        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("Transfer-Encoding: chunked\r\n"));
        assert!(encoded.contains("Content-Type: text/plain\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));

        let encoded = encode(ResponseHead::new("HTTP/1.1", StatusCode::OK, header), PayloadSize::Length(12));
        assert!(encoded.contains("Content-Length: 12\r\n"));
        assert!(!encoded.contains("Transfer-Encoding"));
    }

    #[test]
    fn framing_field_is_not_duplicated() {
        let mut header = Header::new();
        header.set("content-length", "3");
        header.set("Transfer-Encoding", "chunked");
        let encoded = encode(ResponseHead::new("HTTP/1.1", StatusCode::OK, header), PayloadSize::Length(3));

        assert_eq!(encoded, "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n");
    }

    #[test]
    fn every_value_gets_its_own_line() {
        let mut header = Header::new();
        header.add("Set-Cookie", "a=1");
        header.add("Set-Cookie", "b=2");
        let encoded = encode(ResponseHead::new("HTTP/1.1", StatusCode::OK, header), PayloadSize::Empty);

        assert!(encoded.contains("Set-Cookie: a=1\r\nSet-Cookie: b=2\r\n"));
    }
}
