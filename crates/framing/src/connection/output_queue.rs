//! Ordered, corkable queue between an outgoing message and its [`ChunkSink`].
//!
//! While the cork counter is above zero, writes pile up. When it is zero
//! (or drops back to zero) every queued entry is handed to the sink, FIFO,
//! and its completion callback runs right after the sink call. Each entry is
//! delivered exactly once.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::connection::chunk_sink::{ChunkSink, WrittenChunk};
use crate::protocol::{HttpError, SentHead};

/// Called once the chunk it was attached to has been delivered (or has failed).
pub type WriteCallback = Box<dyn FnOnce(Result<(), HttpError>)>;

/// What happens once an entry is delivered.
pub enum Completion {
    Write(WriteCallback),
    /// The message is complete: notify the sink and the `end` callbacks.
    Finish,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Write(_) => f.write_str("Write"),
            Completion::Finish => f.write_str("Finish"),
        }
    }
}

#[derive(Debug)]
pub struct PendingChunk {
    pub bytes: Bytes,
    pub payload: Range<usize>,
    pub on_written: Option<Completion>,
}

impl PendingChunk {
    pub fn new(bytes: Bytes, payload: Range<usize>) -> Self {
        Self { bytes, payload, on_written: None }
    }

    #[must_use]
    pub fn on_written(mut self, completion: Completion) -> Self {
        self.on_written = Some(completion);
        self
    }
}

pub struct OutputQueue {
    entries: VecDeque<PendingChunk>,
    corked: usize,
    next_index: usize,
    queued_bytes: usize,
    finish_callbacks: Vec<WriteCallback>,
    finish_reached: bool,
    sink: Box<dyn ChunkSink>,
}

impl fmt::Debug for OutputQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputQueue")
            .field("entries", &self.entries)
            .field("corked", &self.corked)
            .field("next_index", &self.next_index)
            .field("queued_bytes", &self.queued_bytes)
            .field("finish_reached", &self.finish_reached)
            .finish_non_exhaustive()
    }
}

impl OutputQueue {
    pub fn new(sink: Box<dyn ChunkSink>) -> Self {
        Self {
            entries: VecDeque::new(),
            corked: 0,
            next_index: 0,
            queued_bytes: 0,
            finish_callbacks: Vec::new(),
            finish_reached: false,
            sink,
        }
    }

    /// Queues `chunk` and flushes unless corked. Returns the delivery index
    /// the chunk was given.
    pub fn write(&mut self, chunk: PendingChunk) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        self.queued_bytes += chunk.bytes.len();
        self.entries.push_back(chunk);
        self.flush();
        index
    }

    /// Index the next written chunk will get.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn cork(&mut self) {
        self.corked += 1;
    }

    pub fn uncork(&mut self) {
        if self.corked == 0 {
            warn!("uncork called on a queue that is not corked");
            return;
        }
        self.corked -= 1;
        self.flush();
    }

    pub fn corked(&self) -> usize {
        self.corked
    }

    /// Delivers every queued entry, unless corked.
    pub fn flush(&mut self) {
        if self.corked > 0 || self.entries.is_empty() {
            return;
        }

        trace!(entries = self.entries.len(), bytes = self.queued_bytes, "flush output queue");
        let mut index = self.next_index - self.entries.len();
        while let Some(entry) = self.entries.pop_front() {
            self.queued_bytes -= entry.bytes.len();
            let aborted = self.sink.is_aborted();
            if !aborted {
                let written = WrittenChunk { index, bytes: entry.bytes, payload: entry.payload };
                self.sink.chunk_written(&written);
            }
            index += 1;

            let result = if aborted { Err(HttpError::ConsumerAbort) } else { Ok(()) };
            match entry.on_written {
                Some(Completion::Write(callback)) => callback(result),
                Some(Completion::Finish) => self.finish(result),
                None => {}
            }
        }
    }

    fn finish(&mut self, result: Result<(), HttpError>) {
        self.finish_reached = true;
        if result.is_ok() {
            self.sink.finished();
        }
        for callback in self.finish_callbacks.drain(..) {
            callback(result.clone());
        }
    }

    /// Runs `callback` when the message finishes.
    pub fn on_finish(&mut self, callback: WriteCallback) {
        self.finish_callbacks.push(callback);
    }

    /// Undelivered entries, discarded. Their callbacks get `error`.
    pub fn clear(&mut self, error: &HttpError) {
        self.queued_bytes = 0;
        for entry in self.entries.drain(..) {
            if let Some(Completion::Write(callback)) = entry.on_written {
                callback(Err(error.clone()));
            }
        }
        for callback in self.finish_callbacks.drain(..) {
            callback(Err(error.clone()));
        }
    }

    /// Bytes not yet taken by the consumer: queued here plus pending in the sink.
    pub fn writable_length(&self) -> usize {
        self.queued_bytes + self.sink.pending_bytes()
    }

    /// Bytes still queued here.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn is_finish_reached(&self) -> bool {
        self.finish_reached
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn headers_ready(&mut self, head: &SentHead, chunk_index: usize, header_len: usize) {
        self.sink.headers_ready(head, chunk_index, header_len);
    }

    pub fn sink(&self) -> &dyn ChunkSink {
        self.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> &mut dyn ChunkSink {
        self.sink.as_mut()
    }
}
