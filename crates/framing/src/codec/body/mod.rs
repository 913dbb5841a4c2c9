//! Body framing for outgoing messages.
//!
//! The framing is decided once, when the header block is rendered:
//!
//! - [`PayloadEncoder::chunked`]: `Transfer-Encoding: chunked`, optionally with trailers
//! - [`PayloadEncoder::identity`]: raw bytes, delimited by `Content-Length` or connection close
//! - [`PayloadEncoder::empty`]: messages that must not carry a body
//!
//! All encoders implement [`tokio_util::codec::Encoder`] over [`PayloadItem`](crate::protocol::PayloadItem).

mod chunked_encoder;
mod identity_encoder;
mod payload_encoder;

pub use chunked_encoder::ChunkedEncoder;
pub use identity_encoder::IdentityEncoder;
pub use payload_encoder::PayloadEncoder;
