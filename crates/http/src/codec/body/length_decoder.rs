//! Body framed by `Content-Length`.

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Splits exactly `Content-Length` bytes out of the connection buffer.
///
/// Bytes past the declared length belong to the next request on the
/// connection and are never handed out. Once the length is used up every call
/// yields [`PayloadItem::Eof`] without asking for more input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    /// Body bytes not decoded yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(self.remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
        self.remaining -= len as u64;
        Ok(Some(PayloadItem::Chunk(src.split_to(len).freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_in_front_of_pipelined_request() {
        let mut buffer = BytesMut::from(&b"name=valueGET / HTTP/1.1\r\n\r\n"[..]);
        let mut decoder = LengthDecoder::new(10);

        let bytes = decoder.decode(&mut buffer).unwrap().unwrap().into_bytes().unwrap();
        assert_eq!(&bytes[..], b"name=value");
        assert_eq!(decoder.remaining(), 0);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn hands_out_what_has_arrived() {
        let mut buffer = BytesMut::new();
        let mut decoder = LengthDecoder::new(3);

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"ab");
        assert_eq!(&decoder.decode(&mut buffer).unwrap().unwrap().into_bytes().unwrap()[..], b"ab");
        assert_eq!(decoder.remaining(), 1);
        buffer.extend_from_slice(b"cd");
        assert_eq!(&decoder.decode(&mut buffer).unwrap().unwrap().into_bytes().unwrap()[..], b"c");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"d");
    }

    #[test]
    fn zero_length_never_waits() {
        let mut buffer = BytesMut::new();
        let mut decoder = LengthDecoder::new(0);

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
