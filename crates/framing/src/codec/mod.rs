//! Wire-level codecs of the framing engine.
//!
//! - [`header`]: folding inbound fields, decoding inbound heads and rendering
//!   outgoing header blocks
//! - [`body`]: payload encoders for chunked, identity and body-less framing
//!
//! # Example
//!
//! ```
//! use micro_http_framing::codec::header::{FieldValue, HeaderFolder};
//!
//! let folded = HeaderFolder::fold(&[("Set-Cookie", "a=1"), ("Set-Cookie", "b=2"), ("Accept", "text/html")]);
//! assert_eq!(folded.get("set-cookie"), Some(&FieldValue::List(vec!["a=1".into(), "b=2".into()])));
//! assert_eq!(folded.get_str("accept"), Some("text/html"));
//! ```

pub mod body;
pub mod header;
