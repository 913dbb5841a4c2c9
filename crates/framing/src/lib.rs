//! An HTTP/1.1 message framing engine
//!
//! This crate takes the protocol-correctness part of an HTTP/1.1 server and
//! leaves the socket out. Inbound, it folds raw header lines into a canonical
//! header map. Outbound, it turns a sequence of `set_header`/`write`/`end`
//! calls into a correctly framed message and hands the bytes to a pull-based
//! stream that a transport (or an `http::Response` consumer) reads at its own pace.
//!
//! # Features
//!
//! - Header folding with per-field duplicate rules (`Set-Cookie` kept as a list,
//!   `Cookie` joined with `"; "`, list fields joined with `", "`)
//! - Header rendering that picks `Content-Length`, `Transfer-Encoding: chunked`
//!   or connection-close framing, and negotiates `Connection`/`Keep-Alive`
//! - 204/304/1xx and `HEAD` body suppression
//! - Chunked bodies with trailers
//! - Corking, backpressure through a high-water mark, and cancellation
//! - Interim `100 Continue` and `102 Processing` responses
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use futures::StreamExt;
//! use http_body_util::Empty;
//! use micro_http_framing::exchange::to_req_res;
//! use micro_http_framing::protocol::FramingConfig;
//!
//! # async fn run() -> Result<(), micro_http_framing::protocol::HttpError> {
//! let request = http::Request::get("https://example.com/").body(Empty::<Bytes>::new()).unwrap();
//! let config = FramingConfig::default().with_chunked_encoding_by_default(true);
//! let mut exchange = to_req_res(request, config);
//!
//! exchange.response.set_header("Content-Type", "text/plain")?;
//! exchange.response.write("hello", None)?;
//! exchange.response.write("world", None)?;
//! exchange.response.end(None, None)?;
//!
//! let response = exchange.pending.await?;
//! let mut body = response.into_body();
//! while let Some(chunk) = body.next().await {
//!     println!("{:?}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: errors, configuration, payload types and the inbound message
//! - [`codec`]: header folding and rendering, inbound head decoding, body encoders
//! - [`connection`]: the outgoing message, its output queue and the stream bridge
//! - [`exchange`]: glue between `http::Request`/`http::Response` and the engine
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: top-level error type
//! - [`protocol::ValidationError`]: bad field names, values or status codes
//! - [`protocol::StateError`]: the message lifecycle was used out of order
//! - [`protocol::ParseError`]: inbound head decoding errors
//!
//! Every operation either succeeds or leaves the message unchanged.
//!
//! # Limitations
//!
//! - HTTP/1.1 only (HTTP/1.0 requests are answered without keep-alive)
//! - Single threaded: messages and bridges are `!Send`
//! - Maximum inbound header size: 8KB
//! - Maximum number of inbound headers: 64

pub mod codec;
pub mod connection;
pub mod exchange;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
