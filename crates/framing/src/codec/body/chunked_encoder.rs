use bytes::{Buf, Bytes, BytesMut};
use std::io::Write;

use tokio_util::codec::Encoder;
use tracing::trace;

use crate::protocol::{HttpError, PayloadItem};

/// Frames payload as `Transfer-Encoding: chunked`.
///
/// Each non-empty chunk becomes `"<hex-length>\r\n<payload>\r\n"`. Empty chunks
/// are skipped, since a zero-length chunk would end the body. [`PayloadItem::Eof`]
/// writes the terminator `"0\r\n<trailers>\r\n"` once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedEncoder {
    eof: bool,
    trailer: Bytes,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the serialized trailer section written before the final CRLF.
    ///
    /// `trailer` holds complete `"Name: value\r\n"` lines.
    pub fn set_trailer(&mut self, trailer: Bytes) {
        self.trailer = trailer;
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(helper::Writer(dst), "{:x}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                dst.extend_from_slice(bytes.chunk());
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                trace!(trailer_size = self.trailer.len(), "write chunked terminator");
                dst.reserve(5 + self.trailer.len());
                dst.extend_from_slice(b"0\r\n");
                dst.extend_from_slice(&self.trailer);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
