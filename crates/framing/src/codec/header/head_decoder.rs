//! Decoder for inbound request heads.
//!
//! Unlike a decoder that feeds an `http::HeaderMap`, this one keeps the raw
//! field list exactly as it arrived: names in wire casing, values as latin-1,
//! duplicates in order. Folding happens later, on first access, through
//! [`HeaderFolder`](super::HeaderFolder).
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1

use bytes::BytesMut;
use http::{Method, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::RawHeaderList;
use crate::ensure;
use crate::protocol::ParseError;
use crate::protocol::chunk::latin1_string;

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Start line and raw fields of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingHead {
    pub method: Method,
    /// Path and query, as sent in the request target.
    pub url: String,
    pub version: Version,
    pub raw_headers: RawHeaderList,
}

/// Decodes an [`IncomingHead`] and leaves the body bytes in the buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadDecoder;

impl Decoder for HeadDecoder {
    type Item = IncomingHead;
    type Error = ParseError;

    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - The number of headers exceeds [`MAX_HEADER_NUM`]
    /// - The total header size exceeds [`MAX_HEADER_BYTES`]
    /// - The HTTP version is not supported
    /// - The start line or a field line is malformed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest possible head is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(header_size = body_offset, "parsed request head");
                ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

                let version = match req.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    // HTTP/2 and HTTP/3 have their own framing
                    _ => return Err(ParseError::InvalidVersion(req.version)),
                };

                let method = req
                    .method
                    .ok_or(ParseError::InvalidMethod)
                    .and_then(|m| Method::from_bytes(m.as_bytes()).map_err(|_| ParseError::InvalidMethod))?;
                let url = req.path.ok_or(ParseError::InvalidUri)?.to_owned();

                let raw_headers: RawHeaderList =
                    req.headers.iter().map(|h| (h.name.to_owned(), latin1_string(h.value))).collect();

                let _ = src.split_to(body_offset);

                Ok(Some(IncomingHead { method, url, version, raw_headers }))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}
