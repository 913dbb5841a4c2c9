//! Write payloads and the text encodings they may arrive in.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::protocol::ValidationError;

/// How a text chunk is turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// One byte per character, characters above `0xFF` keep their low byte.
    Latin1,
    /// Same byte mapping as [`Encoding::Latin1`].
    Ascii,
    Base64,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Latin1 => "latin1",
            Encoding::Ascii => "ascii",
            Encoding::Base64 => "base64",
        }
    }

    /// Encodes `text` into its wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEncoding`] if `text` is not valid base64
    /// for [`Encoding::Base64`].
    pub fn encode(self, text: &str) -> Result<Bytes, ValidationError> {
        match self {
            Encoding::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Encoding::Latin1 | Encoding::Ascii => Ok(latin1_bytes(text)),
            Encoding::Base64 => STANDARD
                .decode(text.trim())
                .map(Bytes::from)
                .map_err(|e| ValidationError::invalid_encoding(self.name(), e)),
        }
    }
}

/// Maps every character to a single byte, the way header blocks are serialized.
#[allow(clippy::cast_possible_truncation, reason = "latin-1 keeps the low byte of each character")]
pub(crate) fn latin1_bytes(text: &str) -> Bytes {
    text.chars().map(|c| (u32::from(c) & 0xFF) as u8).collect::<Vec<u8>>().into()
}

/// Inverse of [`latin1_bytes`], used for header bytes read off the wire.
pub(crate) fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// A single payload handed to `write` or `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Bytes),
    Text(String, Encoding),
}

impl Chunk {
    pub fn text<S: Into<String>>(text: S, encoding: Encoding) -> Self {
        Chunk::Text(text.into(), encoding)
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            // raw bytes are passed through untouched, which is what latin-1 does too
            Chunk::Bytes(_) => Encoding::Latin1,
            Chunk::Text(_, encoding) => *encoding,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Chunk::Bytes(bytes) => bytes.is_empty(),
            Chunk::Text(text, _) => text.is_empty(),
        }
    }

    /// Converts the chunk into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEncoding`] when the text cannot be decoded.
    pub fn into_bytes(self) -> Result<Bytes, ValidationError> {
        match self {
            Chunk::Bytes(bytes) => Ok(bytes),
            Chunk::Text(text, encoding) => encoding.encode(&text),
        }
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text, Encoding::Utf8)
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_owned(), Encoding::Utf8)
    }
}
