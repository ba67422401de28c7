//! HTTP request head decoder
//!
//! This module turns the head of an HTTP/1.x request into a [`RequestHeader`]
//! and picks the [`PayloadSize`] that frames its body.
//!
//! # Implementation Details
//!
//! The decoder works line by line on top of [`BufferedReader::read_line`]:
//!
//! 1. Read the request line and split it into method, request-URI and protocol
//! 2. Parse the request-URI, which must be an absolute path or an absolute URI
//! 3. Read `Name: value` lines into a [`Header`] until the blank line
//! 4. Determine the payload framing from the method and the framing headers
//!
//! The amount of bytes a request head may occupy is not checked here; the
//! connection puts a read quota under the reader for that.

use http::{Method, Uri};
use tokio::io::AsyncRead;
use tracing::trace;

use crate::codec::BufferedReader;
use crate::ensure;
use crate::protocol::{Header, ParseError, PayloadSize, RequestHeader};

/// Reads a request head and selects the framing of the body that follows it.
///
/// # Errors
///
/// Returns [`ParseError::ConnectionClosed`] when the stream ends before the
/// request line starts, and a framing error for a malformed request line,
/// URI, protocol or header line.
pub async fn read_request_header<R>(reader: &mut BufferedReader<R>) -> Result<(RequestHeader, PayloadSize), ParseError>
where
    R: AsyncRead + Unpin,
{
    let line = reader.read_line().await?;
    let (method, request_uri, proto) = parse_request_line(&line)?;

    let uri = parse_request_uri(&request_uri)?;
    let (major, minor) = parse_version(&proto)?;

    let header = read_header(reader).await.map_err(|e| match e {
        // a peer hanging up inside the head is not a clean close
        ParseError::ConnectionClosed => ParseError::io(std::io::ErrorKind::UnexpectedEof),
        e => e,
    })?;
    trace!(%method, %uri, header_count = header.len(), "parsed request head");

    let request_header = RequestHeader::new(method, uri, request_uri, proto, (major, minor), header);
    let payload_size = parse_payload(&request_header);
    Ok((request_header, payload_size))
}

/// Reads `Name: value` lines up to and including the blank line ending a header block.
///
/// Values are trimmed; a line whose value is empty is dropped, a line without
/// a `:` is a framing error.
pub async fn read_header<R>(reader: &mut BufferedReader<R>) -> Result<Header, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut header = Header::new();
    loop {
        let line = reader.read_line().await?;
        if line.is_empty() {
            return Ok(header);
        }

        let index = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| ParseError::invalid_header(format!("missing ':' in {:?}", String::from_utf8_lossy(&line))))?;

        let name = std::str::from_utf8(&line[..index]).map_err(|_e| ParseError::invalid_header("name is not utf-8"))?;
        let value = std::str::from_utf8(&line[index + 1..]).map_err(|_e| ParseError::invalid_header("value is not utf-8"))?;

        ensure!(!name.is_empty(), ParseError::invalid_header("empty header name"));

        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        header.add(name, value);
    }
}

fn parse_request_line(line: &[u8]) -> Result<(Method, String, String), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_e| ParseError::invalid_request_line("request line is not utf-8"))?;

    let mut tokens = line.split_ascii_whitespace();
    let (Some(method), Some(request_uri), Some(proto), None) = (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ParseError::invalid_request_line(format!("want method, uri and protocol, got {line:?}")));
    };

    let method = Method::from_bytes(method.as_bytes()).map_err(|_e| ParseError::InvalidMethod)?;
    Ok((method, request_uri.to_string(), proto.to_string()))
}

fn parse_request_uri(request_uri: &str) -> Result<Uri, ParseError> {
    let uri = request_uri.parse::<Uri>().map_err(|_e| ParseError::InvalidUri)?;
    ensure!(request_uri.starts_with('/') || uri.scheme().is_some(), ParseError::InvalidUri);
    Ok(uri)
}

/// Parses `HTTP/<major>.<minor>`.
fn parse_version(proto: &str) -> Result<(u8, u8), ParseError> {
    let invalid = || ParseError::InvalidVersion(proto.to_string());

    let (major, minor) = proto.strip_prefix("HTTP/").and_then(|v| v.split_once('.')).ok_or_else(invalid)?;
    let major = major.parse::<u8>().map_err(|_e| invalid())?;
    let minor = minor.parse::<u8>().map_err(|_e| invalid())?;
    Ok((major, minor))
}

/// Determines the body framing of a request.
///
/// - neither POST nor PUT: no body
/// - `Transfer-Encoding` ending in `chunked`: chunked, even if a Content-Length is present
/// - a numeric `Content-Length`: that many bytes
/// - anything else: no body
fn parse_payload(header: &RequestHeader) -> PayloadSize {
    if !header.need_body() {
        return PayloadSize::Empty;
    }

    let fields = header.header();
    if is_chunked(fields.get_ignore_ascii_case("Transfer-Encoding")) {
        return PayloadSize::Chunked;
    }

    match fields.get_ignore_ascii_case("Content-Length").map(|cl| cl.trim().parse::<u64>()) {
        Some(Ok(length)) => PayloadSize::Length(length),
        _ => PayloadSize::Empty,
    }
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
pub(crate) fn is_chunked(header_value: Option<&str>) -> bool {
    header_value
        .and_then(|value| value.rsplit(',').next())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}
