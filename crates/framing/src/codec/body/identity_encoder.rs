use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{HttpError, PayloadItem};

/// Writes payload bytes as they are, for bodies framed by `Content-Length`
/// or by closing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdentityEncoder {
    written: u64,
}

impl IdentityEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload bytes encoded so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for IdentityEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                self.written += bytes.remaining() as u64;
                dst.extend_from_slice(bytes.chunk());
                Ok(())
            }
            PayloadItem::Eof => Ok(()),
        }
    }
}
