use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes one response at a time: a head, then payload items up to `Eof`.
///
/// The payload encoder picked for the head lives until `Eof` arrives, after
/// which the next head may be written on the same connection.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// True when no response is half written.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(parse_payload_encoder(payload_size));
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let is_eof = payload_item.is_eof();
                payload_encoder.encode(payload_item, dst)?;

                if is_eof {
                    let finished = payload_encoder.is_finish();
                    self.payload_encoder.take();
                    if !finished {
                        return Err(SendError::invalid_body("response body shorter than content-length"));
                    }
                }
                Ok(())
            }
        }
    }
}

fn parse_payload_encoder(payload_size: PayloadSize) -> PayloadEncoder {
    match payload_size {
        PayloadSize::Length(size) => PayloadEncoder::fix_length(size),
        PayloadSize::Chunked => PayloadEncoder::chunked(),
        PayloadSize::Empty => PayloadEncoder::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;
    use http::StatusCode;

    fn head() -> ResponseHead {
        ResponseHead::new("HTTP/1.1", StatusCode::OK, Header::new())
    }

    #[test]
    fn encodes_consecutive_responses() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, &[u8]>::Header((head(), PayloadSize::Length(2))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(&b"ok"[..])), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::<&[u8]>::Eof), &mut dst).unwrap();
        assert!(encoder.is_idle());

        encoder.encode(Message::<_, &[u8]>::Header((head(), PayloadSize::Chunked)), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::<&[u8]>::Eof), &mut dst).unwrap();

        let encoded = String::from_utf8(dst.to_vec()).unwrap();
        assert_eq!(encoded.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(encoded.contains("\r\n\r\nokHTTP/1.1 200 OK\r\n"));
        assert!(encoded.ends_with("\r\n\r\n0\r\n\r\n"));
    }

    #[test]
    fn payload_before_head_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let result = encoder.encode(Message::Payload(PayloadItem::Chunk(&b"x"[..])), &mut dst);
        assert!(result.is_err());
    }

    #[test]
    fn short_body_is_reported_on_eof() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, &[u8]>::Header((head(), PayloadSize::Length(10))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(&b"short"[..])), &mut dst).unwrap();

        let result = encoder.encode(Message::Payload(PayloadItem::<&[u8]>::Eof), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
        assert!(encoder.is_idle());
    }
}
