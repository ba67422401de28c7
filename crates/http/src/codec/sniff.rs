//! Guesses the `Content-Type` of a response from its first bytes.
//!
//! A reduced form of the WHATWG MIME sniffing algorithm: HTML and XML are
//! recognised after leading whitespace, binary formats by their magic bytes,
//! everything else is text unless it contains bytes that never occur in text.

use mime::Mime;

/// At most this many bytes are inspected
const SNIFF_LEN: usize = 512;

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"\x00asm", "application/wasm"),
    (b"\xfe\xff", "text/plain; charset=utf-16be"),
    (b"\xff\xfe", "text/plain; charset=utf-16le"),
    (b"\xef\xbb\xbf", "text/plain; charset=utf-8"),
];

/// Returns the media type `data` most likely has.
///
/// Never fails: unknown binary data is `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> Mime {
    let data = &data[..data.len().min(SNIFF_LEN)];

    let start = data.iter().position(|b| !is_whitespace(*b)).unwrap_or(data.len());
    let text = &data[start..];

    if HTML_TAGS.iter().any(|tag| is_html_tag(text, tag)) {
        return mime::TEXT_HTML_UTF_8;
    }
    if text.starts_with(b"<?xml") {
        return mime::TEXT_XML;
    }

    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM);
    }
    if let Some((_, content_type)) = MAGIC.iter().find(|(magic, _)| data.starts_with(magic)) {
        return content_type.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM);
    }

    if data.iter().any(|b| is_binary(*b)) { mime::APPLICATION_OCTET_STREAM } else { mime::TEXT_PLAIN_UTF_8 }
}

/// Case-insensitive tag prefix followed by a space or `>`.
fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    // comments need no terminator
    tag == b"<!--" || matches!(data[tag.len()], b' ' | b'>')
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
