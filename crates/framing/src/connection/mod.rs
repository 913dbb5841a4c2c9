//! The outgoing side of an exchange.
//!
//! # Components
//!
//! - [`OutgoingMessage`]: owns the header set and the write/end lifecycle of one
//!   message, rendering the header block on first write and framing the body
//! - [`OutputQueue`]: corkable FIFO between the message and its sink
//! - [`ChunkSink`]: where delivered chunks go, plus the backpressure and
//!   cancellation signals coming back
//! - [`StreamBridge`]: a [`ChunkSink`] that turns the pushed chunks into a
//!   pulled [`BodyStream`]
//!
//! Everything here is single threaded: the message, its queue and its bridge
//! share state through `Rc<RefCell<_>>` and `Waker`s.

mod chunk_sink;
mod outgoing_message;
mod output_queue;
mod stream_bridge;

pub use chunk_sink::ChunkSink;
pub use chunk_sink::DiscardSink;
pub use chunk_sink::WrittenChunk;
pub use outgoing_message::OutgoingMessage;
pub use output_queue::Completion;
pub use output_queue::OutputQueue;
pub use output_queue::PendingChunk;
pub use output_queue::WriteCallback;
pub use stream_bridge::BodyStream;
pub use stream_bridge::BridgeMode;
pub use stream_bridge::BridgeSink;
pub use stream_bridge::StreamBridge;
