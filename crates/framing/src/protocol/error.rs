use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Top level error of the framing engine.
///
/// Every variant is cheap to clone: the same error is usually handed back to the
/// caller of an operation *and* delivered to the completion callback attached to it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("validation error: {source}")]
    Validation {
        #[from]
        source: ValidationError,
    },

    #[error("protocol state error: {source}")]
    State {
        #[from]
        source: StateError,
    },

    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("trailers are only allowed with chunked transfer encoding")]
    TrailerInvalid,

    #[error("the consumer aborted the message")]
    ConsumerAbort,

    #[error("byte source failed: {reason}")]
    Source { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: IoError,
    },
}

impl HttpError {
    pub fn source_failed<S: ToString>(str: S) -> Self {
        Self::Source { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: IoError::from(e.into()) }
    }

    /// Returns true if this error means the caller misused the message lifecycle.
    pub fn is_state_error(&self) -> bool {
        matches!(self, HttpError::State { .. })
    }
}

/// Rejected input. Nothing has been queued when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{what} must be a valid HTTP token [\"{name}\"]")]
    InvalidToken { what: &'static str, name: String },

    #[error("invalid character in {what}{}", .field.as_ref().map(|f| format!(" [\"{f}\"]")).unwrap_or_default())]
    InvalidChar { what: &'static str, field: Option<String> },

    #[error("invalid status code: {code}")]
    InvalidStatusCode { code: u32 },

    #[error("invalid {encoding} data: {reason}")]
    InvalidEncoding { encoding: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid_token<S: ToString>(what: &'static str, name: S) -> Self {
        Self::InvalidToken { what, name: name.to_string() }
    }

    pub fn invalid_char<S: ToString>(what: &'static str, field: Option<S>) -> Self {
        Self::InvalidChar { what, field: field.map(|f| f.to_string()) }
    }

    pub fn invalid_status_code(code: u32) -> Self {
        Self::InvalidStatusCode { code }
    }

    pub fn invalid_encoding<S: ToString>(encoding: &'static str, reason: S) -> Self {
        Self::InvalidEncoding { encoding, reason: reason.to_string() }
    }
}

/// The message lifecycle was used out of order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("cannot {op} headers after they are sent to the client")]
    HeadersSent { op: &'static str },

    #[error("write after end")]
    WriteAfterEnd,

    #[error("cannot call {op} after a stream was destroyed")]
    Destroyed { op: &'static str },

    #[error("cannot call {op} after a stream was finished")]
    AlreadyFinished { op: &'static str },

    #[error("the body stream has already been attached")]
    AlreadyAttached,
}

impl StateError {
    pub fn headers_sent(op: &'static str) -> Self {
        Self::HeadersSent { op }
    }

    pub fn destroyed(op: &'static str) -> Self {
        Self::Destroyed { op }
    }

    pub fn already_finished(op: &'static str) -> Self {
        Self::AlreadyFinished { op }
    }
}

/// Errors raised while decoding an inbound request head.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: IoError,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: IoError::from(e.into()) }
    }
}

/// A shared [`io::Error`]. Two of them are equal when their kinds are.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct IoError(Arc<io::Error>);

impl IoError {
    pub fn kind(&self) -> io::ErrorKind {
        self.0.kind()
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self(Arc::new(e))
    }
}

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for IoError {}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_read_like_the_failed_operation() {
        let err: HttpError = StateError::headers_sent("set").into();
        assert_eq!(err.to_string(), "protocol state error: cannot set headers after they are sent to the client");
        assert!(err.is_state_error());

        let err = ValidationError::invalid_char("header content", Some("X-Foo"));
        assert_eq!(err.to_string(), "invalid character in header content [\"X-Foo\"]");

        let err = ValidationError::invalid_char::<&str>("statusMessage", None);
        assert_eq!(err.to_string(), "invalid character in statusMessage");
    }

    #[test]
    fn io_errors_convert_and_compare_by_kind() {
        let err = HttpError::from(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
        assert_eq!(err.to_string(), "io error: peer gone");
        assert_eq!(err.clone(), HttpError::io(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert_ne!(err, HttpError::io(io::ErrorKind::UnexpectedEof));

        let err = ParseError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, ParseError::Io { ref source } if source.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn errors_satisfy_the_codec_bounds() {
        fn codec_error<E: From<io::Error>>() {}
        codec_error::<HttpError>();
        codec_error::<ParseError>();
    }
}
