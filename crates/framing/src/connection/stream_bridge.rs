//! Pull side of an outgoing message.
//!
//! [`StreamBridge::new`] returns the bridge and a [`BridgeSink`]. The sink goes
//! into the [`OutgoingMessage`](super::OutgoingMessage) and buffers whatever the
//! message delivers, so a reader attaching late still sees every chunk. The
//! reader is a [`BodyStream`], which can be used as a `futures::Stream` or as an
//! `http_body::Body`. It can be attached once.
//!
//! Bytes held by the bridge count toward the message's writable length, so
//! `write` asks the producer to pause until the reader catches up.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::poll_fn;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame};
use tracing::{error, trace};

use crate::connection::chunk_sink::{ChunkSink, WrittenChunk};
use crate::protocol::{HttpError, SentHead, StateError};

/// What the reader gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeMode {
    /// Body bytes only: no header block, no chunk framing, no interim responses.
    #[default]
    Body,
    /// Every byte in wire order, ready for a transport.
    Wire,
}

#[derive(Debug, Default)]
struct BridgeState {
    mode: BridgeMode,
    head: Option<SentHead>,
    /// Chunk index and length of the header block within it.
    header_split: Option<(usize, usize)>,
    chunks: VecDeque<Bytes>,
    pending_bytes: usize,
    finished: bool,
    error: Option<HttpError>,
    cancelled: bool,
    attached: bool,

    reader: Option<Waker>,
    head_waiter: Option<Waker>,
    drain_waiter: Option<Waker>,
}

impl BridgeState {
    fn wake_all(&mut self) {
        wake(&mut self.reader);
        wake(&mut self.head_waiter);
        wake(&mut self.drain_waiter);
    }
}

fn wake(waker: &mut Option<Waker>) {
    if let Some(waker) = waker.take() {
        waker.wake();
    }
}

#[derive(Debug)]
pub struct StreamBridge {
    state: Rc<RefCell<BridgeState>>,
}

impl StreamBridge {
    pub fn new(mode: BridgeMode) -> (StreamBridge, BridgeSink) {
        let state = Rc::new(RefCell::new(BridgeState { mode, ..BridgeState::default() }));
        (StreamBridge { state: Rc::clone(&state) }, BridgeSink { state })
    }

    /// Attaches the reader. Chunks delivered so far are replayed first.
    ///
    /// # Errors
    ///
    /// [`StateError::AlreadyAttached`] on the second call.
    pub fn attach(&self) -> Result<BodyStream, HttpError> {
        let mut state = self.state.borrow_mut();
        if state.attached {
            return Err(StateError::AlreadyAttached.into());
        }
        state.attached = true;
        trace!(buffered = state.chunks.len(), "attach reader to stream bridge");
        Ok(BodyStream { state: Rc::clone(&self.state), done: false })
    }

    /// The rendered head, once the header block has been delivered.
    pub fn head(&self) -> Option<SentHead> {
        self.state.borrow().head.clone()
    }

    /// Index of the chunk carrying the header block and the block's length.
    pub fn header_split(&self) -> Option<(usize, usize)> {
        self.state.borrow().header_split
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    pub fn poll_head(&self, cx: &mut Context<'_>) -> Poll<Result<SentHead, HttpError>> {
        let mut state = self.state.borrow_mut();
        if let Some(head) = &state.head {
            return Poll::Ready(Ok(head.clone()));
        }
        if let Some(err) = &state.error {
            return Poll::Ready(Err(err.clone()));
        }
        if state.cancelled {
            return Poll::Ready(Err(HttpError::ConsumerAbort));
        }
        state.head_waiter = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Waits for the header block.
    ///
    /// # Errors
    ///
    /// The error the message was destroyed with, or [`HttpError::ConsumerAbort`]
    /// if the reader cancelled first.
    pub async fn sent_head(&self) -> Result<SentHead, HttpError> {
        poll_fn(|cx| self.poll_head(cx)).await
    }
}

/// The [`ChunkSink`] half of a [`StreamBridge`].
#[derive(Debug)]
pub struct BridgeSink {
    state: Rc<RefCell<BridgeState>>,
}

impl ChunkSink for BridgeSink {
    fn headers_ready(&mut self, head: &SentHead, chunk_index: usize, header_len: usize) {
        let mut state = self.state.borrow_mut();
        state.head = Some(head.clone());
        state.header_split = Some((chunk_index, header_len));
        wake(&mut state.head_waiter);
    }

    fn chunk_written(&mut self, chunk: &WrittenChunk) {
        let mut state = self.state.borrow_mut();
        if state.finished || state.cancelled {
            return;
        }

        let bytes = match state.mode {
            BridgeMode::Body => chunk.payload_bytes(),
            BridgeMode::Wire => chunk.bytes.clone(),
        };
        if bytes.is_empty() {
            return;
        }

        state.pending_bytes += bytes.len();
        state.chunks.push_back(bytes);
        wake(&mut state.reader);
    }

    fn finished(&mut self) {
        let mut state = self.state.borrow_mut();
        state.finished = true;
        state.wake_all();
    }

    fn errored(&mut self, error: &HttpError) {
        let mut state = self.state.borrow_mut();
        if state.finished || state.error.is_some() {
            return;
        }
        state.error = Some(error.clone());
        state.wake_all();
    }

    fn pending_bytes(&self) -> usize {
        self.state.borrow().pending_bytes
    }

    fn is_aborted(&self) -> bool {
        self.state.borrow().cancelled
    }

    fn poll_drain(&mut self, cx: &mut Context<'_>, threshold: usize) -> Poll<()> {
        let mut state = self.state.borrow_mut();
        if state.pending_bytes < threshold || state.cancelled || state.error.is_some() {
            return Poll::Ready(());
        }
        state.drain_waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for BridgeSink {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        if !state.finished && state.error.is_none() {
            state.error = Some(HttpError::source_failed("outgoing message dropped before it finished"));
            state.wake_all();
        }
    }
}

/// Reader of a [`StreamBridge`]. Dropping it before the end cancels the message.
#[derive(Debug)]
pub struct BodyStream {
    state: Rc<RefCell<BridgeState>>,
    done: bool,
}

impl BodyStream {
    /// Stops reading. Buffered chunks are dropped and later writes to the
    /// message fail with [`HttpError::ConsumerAbort`].
    pub fn cancel(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let mut state = self.state.borrow_mut();
        if state.finished && state.chunks.is_empty() {
            return;
        }
        error!(buffered = state.chunks.len(), "reader cancelled the outgoing message");
        state.cancelled = true;
        state.chunks.clear();
        state.pending_bytes = 0;
        state.wake_all();
    }

    /// The message finished and every chunk has been read.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, HttpError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut state = this.state.borrow_mut();
        if let Some(chunk) = state.chunks.pop_front() {
            state.pending_bytes -= chunk.len();
            wake(&mut state.drain_waiter);
            return Poll::Ready(Some(Ok(chunk)));
        }

        if let Some(err) = state.error.clone() {
            this.done = true;
            return Poll::Ready(Some(Err(err)));
        }

        if state.finished {
            this.done = true;
            return Poll::Ready(None);
        }

        state.reader = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Body for BodyStream {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        if self.done {
            return true;
        }
        let state = self.state.borrow();
        state.finished && state.chunks.is_empty()
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        self.cancel();
    }
}
