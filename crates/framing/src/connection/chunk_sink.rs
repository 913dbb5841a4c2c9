use std::ops::Range;
use std::task::{Context, Poll};

use bytes::Bytes;

use crate::protocol::{HttpError, SentHead};

/// A chunk as delivered by the [`OutputQueue`](super::OutputQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenChunk {
    /// Position in delivery order, starting at 0.
    pub index: usize,
    /// Wire bytes: header block, chunk framing and interim responses included.
    pub bytes: Bytes,
    /// The body bytes within `bytes`. Empty for interim responses and framing-only chunks.
    pub payload: Range<usize>,
}

impl WrittenChunk {
    pub fn payload_bytes(&self) -> Bytes {
        self.bytes.slice(self.payload.clone())
    }
}

/// Receives what an outgoing message produces, in order.
///
/// This is the seam between the push side (`write`/`end`) and whatever hands
/// the bytes to a transport. Calls arrive synchronously, from inside the
/// operation that triggered them.
pub trait ChunkSink {
    /// The header block was frozen and will be carried by chunk `chunk_index`,
    /// whose first `header_len` bytes are header material.
    fn headers_ready(&mut self, head: &SentHead, chunk_index: usize, header_len: usize);

    fn chunk_written(&mut self, chunk: &WrittenChunk);

    /// Every chunk has been delivered and the message is complete.
    fn finished(&mut self);

    /// The message was destroyed before it finished.
    fn errored(&mut self, error: &HttpError);

    /// Bytes delivered but not yet taken by the consumer.
    fn pending_bytes(&self) -> usize {
        0
    }

    /// The consumer went away; further chunks would be thrown away.
    fn is_aborted(&self) -> bool {
        false
    }

    /// Resolves once fewer than `threshold` bytes are pending.
    fn poll_drain(&mut self, _cx: &mut Context<'_>, _threshold: usize) -> Poll<()> {
        Poll::Ready(())
    }
}

/// A sink that throws everything away.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl ChunkSink for DiscardSink {
    fn headers_ready(&mut self, _head: &SentHead, _chunk_index: usize, _header_len: usize) {}

    fn chunk_written(&mut self, _chunk: &WrittenChunk) {}

    fn finished(&mut self) {}

    fn errored(&mut self, _error: &HttpError) {}
}
