use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::identity_encoder::IdentityEncoder;
use crate::protocol::{HttpError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};

use tokio_util::codec::Encoder;

/// Encodes the body of an outgoing message with the framing chosen when its
/// header block was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// bytes as they are: `Content-Length` or close-delimited
    Identity(IdentityEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// 1xx, 204, 304 and responses to `HEAD`
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn identity() -> Self {
        Self { kind: Kind::Identity(IdentityEncoder::new()) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    /// Payload bytes written so far, for identity framing only.
    pub fn identity_written(&self) -> Option<u64> {
        match &self.kind {
            Kind::Identity(encoder) => Some(encoder.written()),
            _ => None,
        }
    }

    /// Sets the trailer section. Only chunked framing can carry one.
    pub fn set_trailer(&mut self, trailer: Bytes) {
        if let Kind::Chunked(encoder) = &mut self.kind {
            encoder.set_trailer(trailer);
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Identity(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(mut encoder: PayloadEncoder, items: Vec<PayloadItem>) -> BytesMut {
        let mut dst = BytesMut::new();
        for item in items {
            encoder.encode(item, &mut dst).unwrap();
        }
        dst
    }

    #[test]
    fn identity_passes_bytes_through() {
        let dst = encode_all(
            PayloadEncoder::identity(),
            vec![PayloadItem::Chunk(Bytes::from_static(b"hello")), PayloadItem::Chunk(Bytes::from_static(b"world")), PayloadItem::Eof],
        );
        assert_eq!(&dst[..], b"helloworld");
    }

    #[test]
    fn identity_counts_payload_bytes() {
        let mut encoder = PayloadEncoder::identity();
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        assert_eq!(encoder.identity_written(), Some(5));
        assert_eq!(PayloadEncoder::chunked().identity_written(), None);
    }

    #[test]
    fn chunked_frames_and_terminates() {
        let mut encoder = PayloadEncoder::chunked();
        encoder.set_trailer(Bytes::from_static(b"Expires: never\r\n"));
        let dst = encode_all(encoder, vec![PayloadItem::Chunk(Bytes::from_static(b"hello")), PayloadItem::Eof]);
        assert_eq!(&dst[..], b"5\r\nhello\r\n0\r\nExpires: never\r\n\r\n");
    }

    #[test]
    fn no_body_drops_everything() {
        let encoder = PayloadEncoder::empty();
        assert!(encoder.is_empty());
        let dst = encode_all(encoder, vec![PayloadItem::Chunk(Bytes::from_static(b"hello")), PayloadItem::Eof]);
        assert!(dst.is_empty());
    }
}
