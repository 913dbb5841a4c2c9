//! Serializes an outgoing header block and settles how the message is framed.
//!
//! Rendering happens once per message, right before its first byte is queued.
//! While walking the fields the renderer notes the ones that influence framing
//! (`Connection`, `Content-Length`, `Transfer-Encoding`, `Date`, `Expect`,
//! `Trailer`, `Keep-Alive`), then decides:
//!
//! 1. whether a `Date` field has to be added
//! 2. whether chunked framing must be dropped for a 204 or 304 response
//! 3. what the `Connection` field says and whether this is the last message
//!    on the connection
//! 4. whether the body is framed by `Content-Length`, by chunks, or by closing
//!    the connection
//!
//! The block is `"<start-line>\r\n" + ("<Name>: <Value>\r\n")* + "\r\n"`, each
//! character written as one latin-1 byte.
//!
//! [`HeaderRenderer::render`] works on a copy of the [`RenderState`]: on error
//! the caller's state is untouched.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::codec::header::field_class::is_cookie_field;
use crate::ensure;
use crate::protocol::chunk::latin1_bytes;
use crate::protocol::validate::{contains_token, validate_header_name, validate_header_value};
use crate::protocol::{HttpError, OutgoingValue, SentHead, ValidationError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 512;

/// Framing state of one outgoing message, read and updated by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub chunked_encoding: bool,
    pub should_keep_alive: bool,
    pub use_chunked_encoding_by_default: bool,
    pub send_date: bool,
    /// This is the last message on the connection.
    pub last: bool,
    pub max_requests_on_connection_reached: bool,
    /// No user `Keep-Alive` field was rendered.
    pub default_keep_alive: bool,
    pub removed_connection: bool,
    pub removed_content_length: bool,
    pub removed_transfer_encoding: bool,
    /// Final body length, known when the whole body is handed to `end`.
    pub content_length: Option<u64>,
    pub has_body: bool,
    pub keep_alive_timeout: Option<Duration>,
    /// Response status, `None` for requests.
    pub status: Option<u16>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            chunked_encoding: false,
            should_keep_alive: true,
            use_chunked_encoding_by_default: false,
            send_date: false,
            last: false,
            max_requests_on_connection_reached: false,
            default_keep_alive: true,
            removed_connection: false,
            removed_content_length: false,
            removed_transfer_encoding: false,
            content_length: None,
            has_body: true,
            keep_alive_timeout: None,
            status: None,
        }
    }
}

/// Result of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHead {
    /// The frozen header block, blank line included.
    pub block: Bytes,
    /// Start line, status and field lines as they appear in `block`.
    pub head: SentHead,
    /// An `Expect` field was rendered: the block must be flushed right away.
    pub expect: bool,
}

/// Which reserved fields showed up while walking the header set.
#[derive(Debug, Default)]
struct Seen {
    connection: bool,
    content_length: bool,
    transfer_encoding: bool,
    date: bool,
    expect: bool,
    trailer: bool,
}

/// Accumulates the block and the parsed field list side by side.
struct BlockWriter {
    block: BytesMut,
    fields: Vec<(String, String)>,
}

impl BlockWriter {
    fn new(start_line: &str) -> Self {
        let mut block = BytesMut::with_capacity(INIT_HEADER_SIZE);
        block.put_slice(&latin1_bytes(start_line));
        block.put_slice(b"\r\n");
        Self { block, fields: Vec::new() }
    }

    fn line(&mut self, name: &str, value: &str) {
        self.block.put_slice(&latin1_bytes(name));
        self.block.put_slice(b": ");
        self.block.put_slice(&latin1_bytes(value));
        self.block.put_slice(b"\r\n");
        self.fields.push((name.to_owned(), value.to_owned()));
    }

    fn finish(mut self) -> (Bytes, Vec<(String, String)>) {
        self.block.put_slice(b"\r\n");
        (self.block.freeze(), self.fields)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderRenderer;

impl HeaderRenderer {
    /// Renders `start_line` and `headers` into a header block.
    ///
    /// `validate` checks every name and value; callers pass `false` for fields
    /// that were already validated when they were set.
    ///
    /// # Errors
    ///
    /// - [`ValidationError`] for a bad name, value or status code
    /// - [`HttpError::TrailerInvalid`] when a `Trailer` field is set but the
    ///   body is not chunked
    pub fn render<'a, I>(
        start_line: &str,
        headers: I,
        validate: bool,
        state: &RenderState,
    ) -> Result<(RenderedHead, RenderState), HttpError>
    where
        I: IntoIterator<Item = (&'a str, &'a OutgoingValue)>,
    {
        let mut state = *state;
        if let Some(status) = state.status {
            ensure!((100..=999).contains(&status), ValidationError::invalid_status_code(u32::from(status)));
        }

        let mut seen = Seen::default();
        let mut writer = BlockWriter::new(start_line);

        for (name, value) in headers {
            process_header(&mut writer, &mut seen, &mut state, name, value, validate)?;
        }

        if state.send_date && !seen.date {
            writer.line("Date", &http_date());
        }

        if state.chunked_encoding && matches!(state.status, Some(204 | 304)) {
            debug!(status = ?state.status, "response should not use chunked encoding, closing connection");
            state.chunked_encoding = false;
            state.should_keep_alive = false;
        }

        if state.removed_connection {
            state.last = true;
            state.should_keep_alive = false;
        } else if !seen.connection {
            let should_send_keep_alive =
                state.should_keep_alive && (seen.content_length || state.use_chunked_encoding_by_default);
            if should_send_keep_alive && state.max_requests_on_connection_reached {
                writer.line("Connection", "close");
            } else if should_send_keep_alive {
                writer.line("Connection", "keep-alive");
                if let Some(timeout) = state.keep_alive_timeout.filter(|t| !t.is_zero())
                    && state.default_keep_alive
                {
                    writer.line("Keep-Alive", &format!("timeout={}", timeout.as_secs()));
                }
            } else {
                state.last = true;
                writer.line("Connection", "close");
            }
        }

        if !seen.content_length && !seen.transfer_encoding {
            if !state.has_body {
                state.chunked_encoding = false;
            } else if !state.use_chunked_encoding_by_default {
                // body runs until the connection closes
                state.last = true;
            } else if !seen.trailer
                && !state.removed_content_length
                && let Some(length) = state.content_length
            {
                writer.line("Content-Length", &length.to_string());
            } else if !state.removed_transfer_encoding {
                writer.line("Transfer-Encoding", "chunked");
                state.chunked_encoding = true;
            } else {
                debug!("both Content-Length and Transfer-Encoding are removed");
            }
        }

        ensure!(state.chunked_encoding || !seen.trailer, HttpError::TrailerInvalid);

        let (block, fields) = writer.finish();
        trace!(header_size = block.len(), chunked = state.chunked_encoding, last = state.last, "rendered header block");

        let (status, reason) = split_status_line(start_line);
        let head = SentHead { start_line: start_line.to_owned(), status, reason, fields };
        Ok((RenderedHead { block, head, expect: seen.expect }, state))
    }
}

fn process_header(
    writer: &mut BlockWriter,
    seen: &mut Seen,
    state: &mut RenderState,
    name: &str,
    value: &OutgoingValue,
    validate: bool,
) -> Result<(), ValidationError> {
    if validate {
        validate_header_name("Header name", name)?;
    }
    match value {
        OutgoingValue::Multiple(values) if values.len() >= 2 && is_cookie_field(name) => {
            store_header(writer, seen, state, name, &values.join("; "), validate)
        }
        value => {
            for single in value.values() {
                store_header(writer, seen, state, name, single, validate)?;
            }
            Ok(())
        }
    }
}

fn store_header(
    writer: &mut BlockWriter,
    seen: &mut Seen,
    state: &mut RenderState,
    name: &str,
    value: &str,
    validate: bool,
) -> Result<(), ValidationError> {
    if validate {
        validate_header_value("header content", name, value)?;
    }
    writer.line(name, value);
    match_header(seen, state, name, value);
    Ok(())
}

fn match_header(seen: &mut Seen, state: &mut RenderState, name: &str, value: &str) {
    // shortest reserved name is "date", longest "transfer-encoding"
    if name.len() < 4 || name.len() > 17 {
        return;
    }
    match name.to_ascii_lowercase().as_str() {
        "connection" => {
            seen.connection = true;
            state.removed_connection = false;
            if contains_token(value, "close") {
                state.last = true;
            } else {
                state.should_keep_alive = true;
            }
        }
        "transfer-encoding" => {
            seen.transfer_encoding = true;
            state.removed_transfer_encoding = false;
            if contains_token(value, "chunked") {
                state.chunked_encoding = true;
            }
        }
        "content-length" => {
            seen.content_length = true;
            state.removed_content_length = false;
        }
        "date" => seen.date = true,
        "expect" => seen.expect = true,
        "trailer" => seen.trailer = true,
        "keep-alive" => state.default_keep_alive = false,
        _ => {}
    }
}

/// Current time in IMF-fixdate format.
fn http_date() -> String {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    buf.iter().map(|&b| char::from(b)).collect()
}

/// Splits `"HTTP/1.1 200 OK"` into status and reason. Request lines yield `None`.
fn split_status_line(start_line: &str) -> (Option<u16>, Option<String>) {
    let Some(rest) = start_line.strip_prefix("HTTP/1.1 ") else {
        return (None, None);
    };
    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    match code.parse::<u16>() {
        Ok(status) => (Some(status), Some(reason.to_owned())),
        Err(_) => (None, None),
    }
}
