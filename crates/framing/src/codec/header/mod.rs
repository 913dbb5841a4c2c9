//! Header handling for both directions of an exchange.
//!
//! # Components
//!
//! - [`HeadDecoder`]: decodes an inbound request head with `httparse`, keeping
//!   field names in wire casing and order
//! - [`HeaderFolder`]: folds a raw field list into [`FoldedHeaders`] using the
//!   per-field rules in [`field_class`]
//! - [`HeaderRenderer`]: serializes an outgoing header block and settles the
//!   message framing (chunked, `Content-Length`, keep-alive)

pub mod field_class;
mod head_decoder;
mod header_folder;
mod header_renderer;

pub use field_class::FieldClass;
pub use head_decoder::{HeadDecoder, IncomingHead, MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use header_folder::{DistinctHeaders, FieldValue, FoldedHeaders, HeaderFolder, RawHeaderList};
pub use header_renderer::{HeaderRenderer, RenderState, RenderedHead};
