//! Protocol level types shared by the codecs and the connection layer.
//!
//! - **Errors**: [`HttpError`] and the [`ValidationError`],
//!   [`StateError`] and [`ParseError`] it wraps
//! - **Configuration** ([`FramingConfig`]): per-message framing knobs
//! - **Payload** ([`Chunk`], [`Encoding`], [`PayloadItem`]): what is handed to
//!   `write`/`end` and what the body encoders consume
//! - **Heads** ([`OutgoingValue`], [`SentHead`]): outgoing field values and the
//!   rendered head as the consumer sees it
//! - **Inbound** ([`IncomingMessage`]): request line, lazily folded fields and
//!   the body source

pub mod chunk;
pub use chunk::Chunk;
pub use chunk::Encoding;

mod config;
pub use config::DEFAULT_HIGH_WATER_MARK;
pub use config::FramingConfig;

mod error;
pub use error::HttpError;
pub use error::IoError;
pub use error::ParseError;
pub use error::StateError;
pub use error::ValidationError;

mod incoming;
pub use incoming::IncomingMessage;

mod message;
pub use message::OutgoingValue;
pub use message::PayloadItem;
pub use message::SentHead;

pub mod validate;
