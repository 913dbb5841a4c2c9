//! One outgoing HTTP/1.1 message: header set, write/end lifecycle and framing.
//!
//! # Lifecycle
//!
//! - **Idle**: no header block yet. Fields can be set, appended and removed.
//! - **HeadersRendered**: the first `write`, `end` or `flush_headers` (or an
//!   explicit `write_head`) renders the block through [`HeaderRenderer`]. From
//!   here on any header mutation fails with [`StateError::HeadersSent`].
//! - **Streaming**: the block travels in front of the first body chunk, in the
//!   same buffer. Chunked bodies are framed by the [`PayloadEncoder`].
//! - **Finished**: `end` queues the terminator (or an empty flush) with a
//!   finish marker. The sink is told the message is complete once every
//!   earlier chunk has been delivered.
//!
//! Every operation either succeeds or leaves the message as it was.

use std::future::poll_fn;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode, Version};
use indexmap::IndexMap;
use tokio_util::codec::Encoder;
use tracing::{debug, error, trace};

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{HeaderRenderer, RenderState, RenderedHead};
use crate::connection::chunk_sink::ChunkSink;
use crate::connection::output_queue::{Completion, OutputQueue, PendingChunk, WriteCallback};
use crate::ensure;
use crate::protocol::validate::{contains_token, has_invalid_header_char, validate_header_name, validate_header_value};
use crate::protocol::{
    Chunk, FramingConfig, HttpError, IncomingMessage, OutgoingValue, PayloadItem, SentHead, StateError, ValidationError,
};

const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";
const PROCESSING_LINE: &[u8] = b"HTTP/1.1 102 Processing\r\n\r\n";

#[derive(Debug)]
enum Head {
    Response { status: u16, reason: Option<String>, sent_100: bool, expect_continue: bool },
    Request { method: Method, target: String },
}

/// Outgoing fields keyed by lower-cased name, holding the name as it was set.
type HeaderSet = IndexMap<String, (String, OutgoingValue)>;

#[derive(Debug)]
pub struct OutgoingMessage {
    head: Head,
    headers: HeaderSet,
    state: RenderState,

    /// The frozen header block, once rendered.
    header_block: Option<Bytes>,
    sent_head: Option<SentHead>,
    /// The header block has been queued.
    header_sent: bool,
    written_header_bytes: usize,

    encoder: PayloadEncoder,
    trailer: Bytes,

    finished: bool,
    destroyed: bool,
    need_drain: bool,
    high_water_mark: usize,

    queue: OutputQueue,
}

impl OutgoingMessage {
    /// Creates the response to `request`.
    ///
    /// Responses to `HEAD` carry no body. Responses to HTTP/1.0 requests are not
    /// kept alive and only use chunked framing if the request's `TE` lists it.
    pub fn response<B>(request: &IncomingMessage<B>, config: FramingConfig, sink: Box<dyn ChunkSink>) -> Self {
        let mut state = render_state(&config);
        state.send_date = config.send_date;
        state.status = Some(StatusCode::OK.as_u16());
        state.has_body = request.method() != Method::HEAD;

        if request.version() < Version::HTTP_11 {
            state.use_chunked_encoding_by_default = request.headers().get_str("te").is_some_and(|te| contains_token(te, "chunked"));
            state.should_keep_alive = false;
        }

        let expect_continue = request.headers().get_str("expect").is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));
        let head = Head::Response { status: StatusCode::OK.as_u16(), reason: None, sent_100: false, expect_continue };
        Self::with_head(head, state, &config, sink)
    }

    /// Creates a request message with start line `"<method> <target> HTTP/1.1"`.
    ///
    /// Requests are not date-stamped. Methods that usually carry a body use
    /// chunked framing when the length is unknown.
    pub fn request(method: Method, target: impl Into<String>, config: FramingConfig, sink: Box<dyn ChunkSink>) -> Self {
        let mut state = render_state(&config);
        state.use_chunked_encoding_by_default = !matches!(
            method,
            Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS | Method::TRACE | Method::CONNECT
        );
        let head = Head::Request { method, target: target.into() };
        Self::with_head(head, state, &config, sink)
    }

    fn with_head(head: Head, state: RenderState, config: &FramingConfig, sink: Box<dyn ChunkSink>) -> Self {
        Self {
            head,
            headers: IndexMap::new(),
            state,
            header_block: None,
            sent_head: None,
            header_sent: false,
            written_header_bytes: 0,
            encoder: PayloadEncoder::identity(),
            trailer: Bytes::new(),
            finished: false,
            destroyed: false,
            need_drain: false,
            high_water_mark: config.high_water_mark,
            queue: OutputQueue::new(sink),
        }
    }

    // ----- header set -----

    /// Sets a field, replacing any value under the same case-insensitive name.
    ///
    /// # Errors
    ///
    /// [`StateError::HeadersSent`] once the header block is rendered, or a
    /// [`ValidationError`] for a bad name or value.
    pub fn set_header<V: Into<OutgoingValue>>(&mut self, name: &str, value: V) -> Result<(), HttpError> {
        ensure!(!self.headers_sent(), StateError::headers_sent("set"));
        let value = value.into();
        validate_field(name, &value)?;
        self.headers.insert(name.to_ascii_lowercase(), (name.to_owned(), value));
        Ok(())
    }

    /// Adds values to a field, turning it into a list if it already exists.
    ///
    /// # Errors
    ///
    /// Same as [`OutgoingMessage::set_header`].
    pub fn append_header<V: Into<OutgoingValue>>(&mut self, name: &str, value: V) -> Result<(), HttpError> {
        ensure!(!self.headers_sent(), StateError::headers_sent("append"));
        let value = value.into();
        validate_field(name, &value)?;
        match self.headers.get_mut(&name.to_ascii_lowercase()) {
            Some((_, existing)) => existing.push(value),
            None => {
                self.headers.insert(name.to_ascii_lowercase(), (name.to_owned(), value));
            }
        }
        Ok(())
    }

    pub fn get_header(&self, name: &str) -> Option<&OutgoingValue> {
        self.headers.get(&name.to_ascii_lowercase()).map(|(_, value)| value)
    }

    /// Field names, lower-cased, in insertion order.
    pub fn get_header_names(&self) -> Vec<&str> {
        self.headers.keys().map(String::as_str).collect()
    }

    /// Field names as they were set.
    pub fn get_raw_header_names(&self) -> Vec<&str> {
        self.headers.values().map(|(name, _)| name.as_str()).collect()
    }

    /// Every field keyed by its lower-cased name.
    pub fn get_headers(&self) -> Vec<(&str, &OutgoingValue)> {
        self.headers.iter().map(|(key, (_, value))| (key.as_str(), value)).collect()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// Removes a field. Removing `Connection`, `Content-Length` or
    /// `Transfer-Encoding` also keeps the renderer from adding it back;
    /// removing `Date` turns off the automatic date.
    ///
    /// # Errors
    ///
    /// [`StateError::HeadersSent`] once the header block is rendered.
    pub fn remove_header(&mut self, name: &str) -> Result<(), HttpError> {
        ensure!(!self.headers_sent(), StateError::headers_sent("remove"));
        let key = name.to_ascii_lowercase();
        match key.as_str() {
            "connection" => self.state.removed_connection = true,
            "content-length" => self.state.removed_content_length = true,
            "transfer-encoding" => self.state.removed_transfer_encoding = true,
            "date" => self.state.send_date = false,
            _ => {}
        }
        self.headers.shift_remove(&key);
        Ok(())
    }

    /// The header block has been rendered and can no longer change.
    pub fn headers_sent(&self) -> bool {
        self.header_block.is_some()
    }

    /// The rendered head, once the header block exists.
    pub fn sent_head(&self) -> Option<&SentHead> {
        self.sent_head.as_ref()
    }

    // ----- response head -----

    pub fn status_code(&self) -> Option<u16> {
        match &self.head {
            Head::Response { status, .. } => Some(*status),
            Head::Request { .. } => None,
        }
    }

    /// Status used by the implicit header. Ignored for requests.
    pub fn set_status_code(&mut self, code: u16) {
        if let Head::Response { status, .. } = &mut self.head {
            *status = code;
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        match &self.head {
            Head::Response { reason, .. } => reason.as_deref(),
            Head::Request { .. } => None,
        }
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: S) {
        if let Head::Response { reason, .. } = &mut self.head {
            *reason = Some(message.into());
        }
    }

    /// Renders the response head.
    ///
    /// With fields already set through [`OutgoingMessage::set_header`], `headers`
    /// are merged into them. Otherwise `headers` are rendered verbatim, in order.
    ///
    /// # Errors
    ///
    /// - [`StateError::HeadersSent`] if the head was already rendered
    /// - [`ValidationError`] for a status outside `100..=999`, a bad reason
    ///   phrase or a bad field
    /// - [`HttpError::TrailerInvalid`] for a `Trailer` field without chunked framing
    pub fn write_head<I, N, V>(&mut self, status: u16, reason: Option<&str>, headers: I) -> Result<(), HttpError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<OutgoingValue>,
    {
        let Head::Response { reason: current_reason, sent_100, expect_continue, .. } = &self.head else {
            return self.render_request();
        };
        ensure!(!self.headers_sent(), StateError::headers_sent("write"));
        ensure!((100..=999).contains(&status), ValidationError::invalid_status_code(u32::from(status)));

        let reason = match (reason, current_reason) {
            (Some(reason), _) => reason.to_owned(),
            (None, Some(current)) => current.clone(),
            (None, None) => StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or("unknown")
                .to_owned(),
        };
        ensure!(!has_invalid_header_char(&reason), ValidationError::invalid_char::<&str>("statusMessage", None));

        let mut state = self.state;
        state.status = Some(status);
        if status == 204 || status == 304 || (100..=199).contains(&status) {
            state.has_body = false;
        }
        // the client may still send the body it was waiting to send
        if *expect_continue && !*sent_100 {
            state.should_keep_alive = false;
        }

        let start_line = format!("HTTP/1.1 {status} {reason}");
        let given: Vec<(String, OutgoingValue)> = headers.into_iter().map(|(n, v)| (n.as_ref().to_owned(), v.into())).collect();

        let (rendered, state, merged) = if self.headers.is_empty() {
            let (rendered, state) = HeaderRenderer::render(&start_line, given.iter().map(|(n, v)| (n.as_str(), v)), true, &state)?;
            (rendered, state, None)
        } else {
            let mut merged = self.headers.clone();
            for (name, value) in given {
                validate_field(&name, &value)?;
                merged.insert(name.to_ascii_lowercase(), (name, value));
            }
            let (rendered, state) =
                HeaderRenderer::render(&start_line, merged.values().map(|(n, v)| (n.as_str(), v)), false, &state)?;
            (rendered, state, Some(merged))
        };

        if let Some(merged) = merged {
            self.headers = merged;
        }
        if let Head::Response { status: current_status, reason: current_reason, .. } = &mut self.head {
            *current_status = status;
            *current_reason = Some(reason);
        }
        self.store_header(rendered, state);
        Ok(())
    }

    /// Sends `100 Continue` ahead of the final response.
    pub fn write_continue(&mut self, callback: Option<WriteCallback>) {
        self.write_raw(Bytes::from_static(CONTINUE_LINE), 0..0, callback);
        if let Head::Response { sent_100, .. } = &mut self.head {
            *sent_100 = true;
        }
    }

    /// Sends `102 Processing` ahead of the final response.
    pub fn write_processing(&mut self, callback: Option<WriteCallback>) {
        self.write_raw(Bytes::from_static(PROCESSING_LINE), 0..0, callback);
    }

    /// The request asked for `100-continue`.
    pub fn expects_continue(&self) -> bool {
        matches!(self.head, Head::Response { expect_continue: true, .. })
    }

    // ----- framing knobs, read when the head is rendered -----

    pub fn set_should_keep_alive(&mut self, keep_alive: bool) {
        self.state.should_keep_alive = keep_alive;
    }

    pub fn should_keep_alive(&self) -> bool {
        self.state.should_keep_alive
    }

    pub fn set_use_chunked_encoding_by_default(&mut self, chunked: bool) {
        self.state.use_chunked_encoding_by_default = chunked;
    }

    pub fn set_send_date(&mut self, send_date: bool) {
        self.state.send_date = send_date;
    }

    pub fn set_keep_alive_timeout(&mut self, timeout: Option<Duration>) {
        self.state.keep_alive_timeout = timeout;
    }

    pub fn set_max_requests_on_connection_reached(&mut self, reached: bool) {
        self.state.max_requests_on_connection_reached = reached;
    }

    /// This is the last message on its connection.
    pub fn is_last(&self) -> bool {
        self.state.last
    }

    pub fn is_chunked(&self) -> bool {
        self.state.chunked_encoding
    }

    pub fn has_body(&self) -> bool {
        self.state.has_body
    }

    /// Length of the header block, once it has been queued.
    pub fn written_header_bytes(&self) -> usize {
        self.written_header_bytes
    }

    // ----- body -----

    /// Writes a body chunk, rendering the header block first if needed.
    ///
    /// Returns `false` once more than the high-water mark is waiting for the
    /// consumer: the caller should pause until [`OutgoingMessage::drain`]
    /// resolves. Writes to a message without a body are dropped.
    ///
    /// `callback` runs exactly once: after delivery, or with the error.
    ///
    /// # Errors
    ///
    /// - [`StateError::WriteAfterEnd`] after `end`
    /// - [`StateError::Destroyed`] after `destroy`
    /// - [`HttpError::ConsumerAbort`] once the consumer went away
    /// - errors from rendering the implicit header or encoding the chunk
    pub fn write<C: Into<Chunk>>(&mut self, chunk: C, callback: Option<WriteCallback>) -> Result<bool, HttpError> {
        let ret = self.write_inner(chunk.into(), callback, false)?;
        if !ret {
            self.need_drain = true;
        }
        Ok(ret)
    }

    fn write_inner(&mut self, chunk: Chunk, callback: Option<WriteCallback>, from_end: bool) -> Result<bool, HttpError> {
        if let Some(err) = self.write_error() {
            return fail(callback, err);
        }

        let data = match chunk.into_bytes() {
            Ok(data) => data,
            Err(e) => return fail(callback, e.into()),
        };

        if !self.headers_sent() {
            let content_length = from_end.then_some(data.len() as u64);
            if let Err(e) = self.implicit_header(content_length) {
                return fail(callback, e);
            }
        }

        if self.encoder.is_empty() {
            debug!(size = data.len(), "message must not have a body, ignoring write");
            if let Some(callback) = callback {
                callback(Ok(()));
            }
            return Ok(true);
        }

        let (framed, payload) = match self.frame_body(data) {
            Ok(framed) => framed,
            Err(e) => return fail(callback, e),
        };
        self.send(framed, payload, callback.map(Completion::Write));
        Ok(self.queue.writable_length() < self.high_water_mark)
    }

    fn write_error(&self) -> Option<HttpError> {
        if self.finished {
            Some(StateError::WriteAfterEnd.into())
        } else if self.destroyed {
            Some(StateError::destroyed("write").into())
        } else if self.queue.sink().is_aborted() {
            Some(HttpError::ConsumerAbort)
        } else {
            None
        }
    }

    /// Sets the trailer section sent after a chunked body.
    ///
    /// List values with more than one entry are sent as one line each.
    ///
    /// # Errors
    ///
    /// - [`ValidationError`] for a bad trailer name or value
    /// - [`HttpError::TrailerInvalid`] if the body is already known not to be chunked
    pub fn add_trailers<I, N, V>(&mut self, trailers: I) -> Result<(), HttpError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<OutgoingValue>,
    {
        let mut block = BytesMut::new();
        for (name, value) in trailers {
            let name = name.as_ref();
            validate_header_name("Trailer name", name)?;
            match value.into() {
                OutgoingValue::Multiple(values) if values.len() > 1 => {
                    for value in &values {
                        push_trailer(&mut block, name, value)?;
                    }
                }
                value => push_trailer(&mut block, name, &value.values().collect::<Vec<_>>().join("; "))?,
            }
        }
        ensure!(!self.headers_sent() || self.state.chunked_encoding, HttpError::TrailerInvalid);
        self.trailer = block.freeze();
        Ok(())
    }

    /// Ends the message, writing `chunk` first if given.
    ///
    /// `callback` runs once the message has finished. Ending an already ended
    /// message is allowed: the callback is kept until the finish, or gets
    /// [`StateError::AlreadyFinished`] if the message finished already.
    ///
    /// # Errors
    ///
    /// [`StateError::WriteAfterEnd`] when a chunk is given after `end`, plus the
    /// errors of [`OutgoingMessage::write`].
    pub fn end(&mut self, chunk: Option<Chunk>, callback: Option<WriteCallback>) -> Result<(), HttpError> {
        let chunk = chunk.filter(|c| !c.is_empty());
        let mut corked = false;

        if !self.finished
            && let Some(err) = self.write_error()
        {
            return fail(callback, err);
        }

        if let Some(chunk) = chunk {
            if self.finished {
                return fail(callback, StateError::WriteAfterEnd.into());
            }
            self.queue.cork();
            corked = true;
            if let Err(e) = self.write_inner(chunk, None, true) {
                self.queue.uncork();
                return fail(callback, e);
            }
        } else if self.finished {
            if let Some(callback) = callback {
                if self.queue.is_finish_reached() {
                    callback(Err(StateError::already_finished("end").into()));
                } else {
                    self.queue.on_finish(callback);
                }
            }
            return Ok(());
        } else if !self.headers_sent() {
            self.queue.cork();
            corked = true;
            if let Err(e) = self.implicit_header(Some(0)) {
                self.queue.uncork();
                return fail(callback, e);
            }
        }

        if !self.trailer.is_empty() && !self.encoder.is_chunked() {
            debug!(trailer_size = self.trailer.len(), "message is not chunked, dropping trailers");
        }

        let mut terminator = BytesMut::new();
        self.encoder.set_trailer(self.trailer.clone());
        if let Err(e) = self.encoder.encode(PayloadItem::<Bytes>::Eof, &mut terminator) {
            if corked {
                self.queue.uncork();
            }
            return fail(callback, e);
        }
        self.check_body_length();

        if let Some(callback) = callback {
            self.queue.on_finish(callback);
        }
        self.send(terminator.freeze(), 0..0, Some(Completion::Finish));

        if corked {
            self.queue.uncork();
        }
        self.finished = true;
        trace!(last = self.state.last, chunked = self.state.chunked_encoding, "outgoing message end");
        Ok(())
    }

    /// Renders the header block if needed and queues it right away.
    ///
    /// # Errors
    ///
    /// Errors from rendering the implicit header.
    pub fn flush_headers(&mut self) -> Result<(), HttpError> {
        if !self.headers_sent() {
            self.implicit_header(None)?;
        }
        if !self.header_sent {
            self.send(Bytes::new(), 0..0, None);
        }
        Ok(())
    }

    /// Destroys the message. A message that has not finished ends its stream
    /// with `err`, or with [`StateError::Destroyed`].
    pub fn destroy(&mut self, err: Option<HttpError>) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if self.finished && self.queue.is_empty() {
            return;
        }

        let err = err.unwrap_or_else(|| StateError::destroyed("write").into());
        error!(cause = %err, "outgoing message destroyed before it finished");
        self.queue.clear(&err);
        self.queue.sink_mut().errored(&err);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // ----- writable state -----

    pub fn cork(&mut self) {
        self.queue.cork();
    }

    pub fn uncork(&mut self) {
        self.queue.uncork();
    }

    /// Bytes written but not yet taken by the consumer.
    pub fn writable_length(&self) -> usize {
        self.queue.writable_length()
    }

    pub fn writable_high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn writable_corked(&self) -> usize {
        self.queue.corked()
    }

    /// `end` has been called.
    pub fn writable_ended(&self) -> bool {
        self.finished
    }

    /// Every chunk, the last one included, has been delivered.
    pub fn writable_finished(&self) -> bool {
        self.queue.is_finish_reached()
    }

    pub fn writable_need_drain(&self) -> bool {
        !self.destroyed && !self.finished && self.need_drain
    }

    /// Waits until the consumer has taken enough bytes to fall below the
    /// high-water mark.
    pub async fn drain(&mut self) {
        poll_fn(|cx| self.poll_drain(cx)).await;
        self.need_drain = false;
    }

    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.writable_length() < self.high_water_mark || self.destroyed || self.queue.corked() > 0 {
            return Poll::Ready(());
        }
        let threshold = self.high_water_mark.saturating_sub(self.queue.queued_bytes());
        self.queue.sink_mut().poll_drain(cx, threshold)
    }

    // ----- internals -----

    /// Renders the head on the first `write`/`end`. `content_length` is the
    /// body length when `end` knows it; the state is left as it was on error.
    fn implicit_header(&mut self, content_length: Option<u64>) -> Result<(), HttpError> {
        let saved = self.state;
        if content_length.is_some() {
            self.state.content_length = content_length;
        }
        let result = match &self.head {
            Head::Response { status, .. } => {
                let status = *status;
                self.write_head(status, None, std::iter::empty::<(&str, OutgoingValue)>())
            }
            Head::Request { .. } => self.render_request(),
        };
        if result.is_err() {
            self.state = saved;
        }
        result
    }

    fn render_request(&mut self) -> Result<(), HttpError> {
        let Head::Request { method, target } = &self.head else {
            return Ok(());
        };
        ensure!(!self.headers_sent(), StateError::headers_sent("render"));
        let start_line = format!("{method} {target} HTTP/1.1");
        let (rendered, state) =
            HeaderRenderer::render(&start_line, self.headers.values().map(|(n, v)| (n.as_str(), v)), false, &self.state)?;
        self.store_header(rendered, state);
        Ok(())
    }

    fn store_header(&mut self, rendered: RenderedHead, state: RenderState) {
        self.state = state;
        self.encoder = if !state.has_body {
            PayloadEncoder::empty()
        } else if state.chunked_encoding {
            PayloadEncoder::chunked()
        } else {
            PayloadEncoder::identity()
        };
        self.header_block = Some(rendered.block);
        self.sent_head = Some(rendered.head);
        self.header_sent = false;

        if rendered.expect {
            self.send(Bytes::new(), 0..0, None);
        }
    }

    /// Frames `data` for the wire and returns where the payload sits in it.
    fn frame_body(&mut self, data: Bytes) -> Result<(Bytes, std::ops::Range<usize>), HttpError> {
        let len = data.len();
        let mut framed = BytesMut::with_capacity(len + 12);
        self.encoder.encode(PayloadItem::Chunk(data), &mut framed)?;
        // chunked framing closes each chunk with a CRLF
        let end = if self.encoder.is_chunked() && len > 0 { framed.len() - 2 } else { framed.len() };
        Ok((framed.freeze(), end.saturating_sub(len)..end))
    }

    fn check_body_length(&self) {
        let declared = self.sent_head.as_ref().and_then(|head| head.get("content-length")).and_then(|v| v.parse::<u64>().ok());
        if let Some(written) = self.encoder.identity_written()
            && let Some(declared) = declared
            && written != declared
        {
            debug!(declared, written, "body length does not match Content-Length");
        }
    }

    /// Queues `data`, putting the header block in front of it the first time.
    fn send(&mut self, data: Bytes, payload: std::ops::Range<usize>, on_written: Option<Completion>) {
        if !self.header_sent
            && let Some(header) = &self.header_block
        {
            let header_len = header.len();
            let mut buf = BytesMut::with_capacity(header_len + data.len());
            buf.extend_from_slice(header);
            buf.extend_from_slice(&data);

            self.written_header_bytes = header_len;
            self.header_sent = true;
            if let Some(head) = &self.sent_head {
                let chunk_index = self.queue.next_index();
                self.queue.headers_ready(head, chunk_index, header_len);
            }

            let payload = payload.start + header_len..payload.end + header_len;
            self.queue_chunk(buf.freeze(), payload, on_written);
            return;
        }
        self.queue_chunk(data, payload, on_written);
    }

    fn write_raw(&mut self, data: Bytes, payload: std::ops::Range<usize>, callback: Option<WriteCallback>) {
        self.queue_chunk(data, payload, callback.map(Completion::Write));
    }

    fn queue_chunk(&mut self, data: Bytes, payload: std::ops::Range<usize>, on_written: Option<Completion>) {
        let mut chunk = PendingChunk::new(data, payload);
        chunk.on_written = on_written;
        self.queue.write(chunk);
    }
}

fn render_state(config: &FramingConfig) -> RenderState {
    RenderState {
        use_chunked_encoding_by_default: config.use_chunked_encoding_by_default,
        keep_alive_timeout: config.keep_alive_timeout,
        max_requests_on_connection_reached: config.max_requests_on_connection_reached,
        ..RenderState::default()
    }
}

fn validate_field(name: &str, value: &OutgoingValue) -> Result<(), ValidationError> {
    validate_header_name("Header name", name)?;
    value.values().try_for_each(|v| validate_header_value("header content", name, v))
}

fn push_trailer(block: &mut BytesMut, name: &str, value: &str) -> Result<(), ValidationError> {
    validate_header_value("trailer content", name, value)?;
    block.extend_from_slice(&crate::protocol::chunk::latin1_bytes(&format!("{name}: {value}\r\n")));
    Ok(())
}

/// Hands `err` to the callback and returns it.
fn fail<T>(callback: Option<WriteCallback>, err: HttpError) -> Result<T, HttpError> {
    if let Some(callback) = callback {
        callback(Err(err.clone()));
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::chunk_sink::WrittenChunk;
    use crate::protocol::Encoding;
    use http_body_util::Empty;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        bytes: BytesMut,
        body: BytesMut,
        head: Option<(SentHead, usize, usize)>,
        finished: bool,
        error: Option<HttpError>,
        aborted: bool,
    }

    #[derive(Clone, Default)]
    struct WireSink(Rc<RefCell<Wire>>);

    impl ChunkSink for WireSink {
        fn headers_ready(&mut self, head: &SentHead, chunk_index: usize, header_len: usize) {
            self.0.borrow_mut().head = Some((head.clone(), chunk_index, header_len));
        }

        fn chunk_written(&mut self, chunk: &WrittenChunk) {
            let mut wire = self.0.borrow_mut();
            wire.bytes.extend_from_slice(&chunk.bytes);
            wire.body.extend_from_slice(&chunk.payload_bytes());
        }

        fn finished(&mut self) {
            self.0.borrow_mut().finished = true;
        }

        fn errored(&mut self, error: &HttpError) {
            self.0.borrow_mut().error = Some(error.clone());
        }

        fn is_aborted(&self) -> bool {
            self.0.borrow().aborted
        }
    }

    fn request(method: Method, version: Version, headers: &[(&str, &str)]) -> IncomingMessage<Empty<Bytes>> {
        let raw = headers.iter().map(|(n, v)| ((*n).to_owned(), (*v).to_owned())).collect();
        IncomingMessage::new(method, "/", version, raw, None)
    }

    fn response_with(config: FramingConfig, req: &IncomingMessage<Empty<Bytes>>) -> (OutgoingMessage, Rc<RefCell<Wire>>) {
        let sink = WireSink::default();
        let wire = Rc::clone(&sink.0);
        (OutgoingMessage::response(req, config, Box::new(sink)), wire)
    }

    fn response(config: FramingConfig) -> (OutgoingMessage, Rc<RefCell<Wire>>) {
        response_with(config, &request(Method::GET, Version::HTTP_11, &[]))
    }

    fn no_date() -> FramingConfig {
        FramingConfig::default().with_send_date(false)
    }

    fn wire_text(wire: &Rc<RefCell<Wire>>) -> String {
        String::from_utf8(wire.borrow().bytes.to_vec()).unwrap()
    }

    fn recorder() -> (Rc<RefCell<Vec<Result<(), HttpError>>>>, WriteCallback) {
        let results = Rc::new(RefCell::new(Vec::new()));
        let results_clone = Rc::clone(&results);
        (results, Box::new(move |result| results_clone.borrow_mut().push(result)))
    }

    #[test]
    fn end_with_body_uses_content_length_when_chunked_by_default() {
        let (mut res, wire) = response(no_date().with_chunked_encoding_by_default(true));
        res.end(Some("hello".into()), None).unwrap();

        assert_eq!(wire_text(&wire), "HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(&wire.borrow().body[..], b"hello");
        assert!(wire.borrow().finished);
        assert!(res.writable_finished());
        assert!(res.writable_ended());
    }

    #[test]
    fn streamed_body_is_chunked_when_length_unknown() {
        let (mut res, wire) = response(no_date().with_chunked_encoding_by_default(true));
        res.set_header("Content-Type", "text/plain").unwrap();
        assert!(res.write("hello", None).unwrap());
        assert!(res.headers_sent());
        res.write("world", None).unwrap();
        res.end(None, None).unwrap();

        assert_eq!(
            wire_text(&wire),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\nTransfer-Encoding: chunked\r\n\r\n\
             5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n"
        );
        assert_eq!(&wire.borrow().body[..], b"helloworld");
        assert!(res.is_chunked());
    }

    #[test]
    fn unknown_length_without_chunked_default_is_close_delimited() {
        let (mut res, wire) = response(no_date());
        res.write("hello", None).unwrap();
        res.end(None, None).unwrap();

        assert_eq!(wire_text(&wire), "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nhello");
        assert!(res.is_last());
    }

    #[test]
    fn header_split_is_reported() {
        let (mut res, wire) = response(no_date());
        res.write("body", None).unwrap();

        let wire = wire.borrow();
        let (head, chunk_index, header_len) = wire.head.as_ref().unwrap();
        assert_eq!(*chunk_index, 0);
        assert_eq!(*header_len, res.written_header_bytes());
        assert_eq!(&wire.bytes[*header_len..], b"body");
        assert_eq!(head.status(), Some(200));
    }

    #[test]
    fn write_after_end_fails() {
        let (mut res, _wire) = response(no_date());
        res.end(None, None).unwrap();

        let (results, callback) = recorder();
        let err = res.write("late", Some(callback)).unwrap_err();
        assert_eq!(err, StateError::WriteAfterEnd.into());
        assert_eq!(*results.borrow(), vec![Err(HttpError::from(StateError::WriteAfterEnd))]);

        let err = res.end(Some("late".into()), None).unwrap_err();
        assert_eq!(err, StateError::WriteAfterEnd.into());
    }

    #[test]
    fn end_twice_reports_already_finished() {
        let (mut res, _wire) = response(no_date());
        res.end(None, None).unwrap();

        let (results, callback) = recorder();
        res.end(None, Some(callback)).unwrap();
        assert_eq!(*results.borrow(), vec![Err(HttpError::from(StateError::already_finished("end")))]);
    }

    #[test]
    fn end_callback_waits_for_uncork() {
        let (mut res, wire) = response(no_date());
        res.cork();
        res.write("a", None).unwrap();

        let (results, callback) = recorder();
        res.end(None, Some(callback)).unwrap();
        assert!(results.borrow().is_empty());
        assert!(!res.writable_finished());
        assert!(wire.borrow().bytes.is_empty());

        let (late, late_callback) = recorder();
        res.end(None, Some(late_callback)).unwrap();

        res.uncork();
        assert_eq!(*results.borrow(), vec![Ok(())]);
        assert_eq!(*late.borrow(), vec![Ok(())]);
        assert!(res.writable_finished());
    }

    #[test]
    fn header_mutation_after_render_fails() {
        let (mut res, _wire) = response(no_date());
        res.flush_headers().unwrap();

        assert_eq!(res.set_header("X-Late", "1"), Err(StateError::headers_sent("set").into()));
        assert_eq!(res.append_header("X-Late", "1"), Err(StateError::headers_sent("append").into()));
        assert_eq!(res.remove_header("X-Late"), Err(StateError::headers_sent("remove").into()));
        assert_eq!(
            res.write_head(200, None, std::iter::empty::<(&str, &str)>()),
            Err(StateError::headers_sent("write").into())
        );
    }

    #[test]
    fn header_api() {
        let (mut res, _wire) = response(no_date());
        res.set_header("X-Token", "a").unwrap();
        res.append_header("x-token", "b").unwrap();
        res.set_header("Content-Type", "text/html").unwrap();

        assert_eq!(res.get_header("X-TOKEN"), Some(&OutgoingValue::from(vec!["a", "b"])));
        assert_eq!(res.get_header_names(), vec!["x-token", "content-type"]);
        assert_eq!(res.get_raw_header_names(), vec!["X-Token", "Content-Type"]);
        assert!(res.has_header("content-type"));
        assert_eq!(res.get_headers().len(), 2);

        res.remove_header("content-type").unwrap();
        assert!(!res.has_header("Content-Type"));

        assert_eq!(res.set_header("Bad Name", "x"), Err(ValidationError::invalid_token("Header name", "Bad Name").into()));
        assert_eq!(
            res.set_header("X-Bad", "a\nb"),
            Err(ValidationError::invalid_char("header content", Some("X-Bad")).into())
        );
        assert!(!res.has_header("x-bad"));
    }

    #[test]
    fn write_head_validates_and_renders_verbatim() {
        let (mut res, wire) = response(no_date());
        assert_eq!(
            res.write_head(1000, None, std::iter::empty::<(&str, &str)>()),
            Err(ValidationError::invalid_status_code(1000).into())
        );
        assert_eq!(
            res.write_head(200, Some("bad\r\n"), std::iter::empty::<(&str, &str)>()),
            Err(ValidationError::invalid_char::<&str>("statusMessage", None).into())
        );
        assert!(!res.headers_sent());

        res.write_head(201, None, [("X-B", "2"), ("X-A", "1")]).unwrap();
        res.end(None, None).unwrap();
        assert_eq!(wire_text(&wire), "HTTP/1.1 201 Created\r\nX-B: 2\r\nX-A: 1\r\nConnection: close\r\n\r\n");
    }

    #[test]
    fn write_head_merges_into_set_headers() {
        let (mut res, _wire) = response(no_date());
        res.set_header("X-A", "1").unwrap();
        res.write_head(599, None, [("x-a", "2"), ("X-B", "3")]).unwrap();

        let head = res.sent_head().unwrap();
        assert_eq!(head.start_line(), "HTTP/1.1 599 unknown");
        assert_eq!(head.get("x-a").as_deref(), Some("2"));
        assert_eq!(head.get("x-b").as_deref(), Some("3"));
    }

    #[test]
    fn no_content_drops_body_and_chunking() {
        let (mut res, wire) = response(no_date().with_chunked_encoding_by_default(true));
        res.set_header("Transfer-Encoding", "chunked").unwrap();
        res.write_head(204, None, std::iter::empty::<(&str, &str)>()).unwrap();

        let (results, callback) = recorder();
        assert!(res.write("ignored", Some(callback)).unwrap());
        assert_eq!(*results.borrow(), vec![Ok(())]);
        res.end(None, None).unwrap();

        assert_eq!(
            wire_text(&wire),
            "HTTP/1.1 204 No Content\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
        );
        assert!(!res.is_chunked());
        assert!(!res.should_keep_alive());
    }

    #[test]
    fn not_modified_drops_chunking_and_closes() {
        let (mut res, wire) = response(no_date().with_chunked_encoding_by_default(true));
        res.set_header("Transfer-Encoding", "chunked").unwrap();
        res.write_head(304, None, std::iter::empty::<(&str, &str)>()).unwrap();
        assert!(res.write("ignored", None).unwrap());
        res.end(None, None).unwrap();

        assert_eq!(
            wire_text(&wire),
            "HTTP/1.1 304 Not Modified\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
        );
        assert!(wire.borrow().body.is_empty());
        assert!(!res.is_chunked());
        assert!(res.is_last());
    }

    #[test]
    fn failed_implicit_header_in_write_queues_nothing() {
        let (mut res, wire) = response(no_date());
        res.set_status_code(99);

        let (results, callback) = recorder();
        let err = res.write("x", Some(callback)).unwrap_err();
        assert_eq!(err, ValidationError::invalid_status_code(99).into());
        assert_eq!(*results.borrow(), vec![Err(err)]);
        assert!(!res.headers_sent());
        assert_eq!(res.writable_length(), 0);
        assert!(wire.borrow().bytes.is_empty());
        assert!(wire.borrow().head.is_none());
    }

    #[test]
    fn failed_end_does_not_leak_its_length_into_the_next_head() {
        let (mut res, wire) = response(no_date().with_chunked_encoding_by_default(true));
        res.set_status_code(1000);

        let (results, callback) = recorder();
        let err = res.end(Some("hi".into()), Some(callback)).unwrap_err();
        assert_eq!(err, ValidationError::invalid_status_code(1000).into());
        assert_eq!(*results.borrow(), vec![Err(err)]);
        assert!(!res.writable_ended());
        assert_eq!(res.writable_corked(), 0);
        assert!(wire.borrow().bytes.is_empty());

        res.set_status_code(200);
        res.write("hello world", None).unwrap();
        res.end(None, None).unwrap();
        assert_eq!(
            wire_text(&wire),
            "HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nTransfer-Encoding: chunked\r\n\r\nb\r\nhello world\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn trailers_are_dropped_from_a_close_delimited_body() {
        let (mut res, wire) = response(no_date());
        res.add_trailers([("X-Sum", "1")]).unwrap();
        res.write("data", None).unwrap();
        res.end(None, None).unwrap();

        assert_eq!(wire_text(&wire), "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\ndata");
        assert!(wire.borrow().finished);
    }

    #[test]
    fn head_request_gets_no_body() {
        let req = request(Method::HEAD, Version::HTTP_11, &[]);
        let (mut res, wire) = response_with(no_date(), &req);
        res.set_header("Content-Length", 5u64).unwrap();
        res.end(Some("hello".into()), None).unwrap();

        assert_eq!(wire_text(&wire), "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: keep-alive\r\n\r\n");
        assert!(wire.borrow().body.is_empty());
    }

    #[test]
    fn http10_request_is_not_kept_alive() {
        let req = request(Method::GET, Version::HTTP_10, &[("TE", "chunked")]);
        let (mut res, wire) = response_with(no_date(), &req);
        res.write("x", None).unwrap();
        res.end(None, None).unwrap();

        assert_eq!(wire_text(&wire), "HTTP/1.1 200 OK\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nx\r\n0\r\n\r\n");
    }

    #[test]
    fn trailers_follow_a_chunked_body() {
        let (mut res, wire) = response(no_date().with_chunked_encoding_by_default(true));
        res.set_header("Trailer", "Content-MD5").unwrap();
        res.write("data", None).unwrap();
        res.add_trailers([("Content-MD5", "7895bf4b8828b55ceaf47747b4bca667")]).unwrap();
        res.end(None, None).unwrap();

        assert!(wire_text(&wire).ends_with("4\r\ndata\r\n0\r\nContent-MD5: 7895bf4b8828b55ceaf47747b4bca667\r\n\r\n"));
    }

    #[test]
    fn trailers_without_chunked_are_rejected() {
        let (mut res, _wire) = response(no_date());
        res.write("data", None).unwrap();
        assert_eq!(res.add_trailers([("X-Sum", "1")]), Err(HttpError::TrailerInvalid));
        assert_eq!(
            res.add_trailers([("X-Sum", "a\rb")]),
            Err(ValidationError::invalid_char("trailer content", Some("X-Sum")).into())
        );
    }

    #[test]
    fn expect_header_flushes_head() {
        let (mut res, wire) = response(no_date());
        res.set_header("Expect", "100-continue").unwrap();
        res.write_head(200, None, std::iter::empty::<(&str, &str)>()).unwrap();

        assert!(wire_text(&wire).starts_with("HTTP/1.1 200 OK\r\nExpect: 100-continue\r\n"));
    }

    #[test]
    fn interim_responses_precede_the_head() {
        let req = request(Method::POST, Version::HTTP_11, &[("Expect", "100-continue")]);
        let (mut res, wire) = response_with(no_date().with_chunked_encoding_by_default(true), &req);
        assert!(res.expects_continue());

        res.write_processing(None);
        res.write_continue(None);
        res.end(Some("ok".into()), None).unwrap();

        assert_eq!(
            wire_text(&wire),
            "HTTP/1.1 102 Processing\r\n\r\nHTTP/1.1 100 Continue\r\n\r\n\
             HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nContent-Length: 2\r\n\r\nok"
        );
        assert_eq!(&wire.borrow().body[..], b"ok");
    }

    #[test]
    fn expect_continue_without_100_closes() {
        let req = request(Method::POST, Version::HTTP_11, &[("Expect", "100-continue")]);
        let (mut res, _wire) = response_with(no_date().with_chunked_encoding_by_default(true), &req);
        res.end(Some("no".into()), None).unwrap();
        assert_eq!(res.sent_head().unwrap().get("connection").as_deref(), Some("close"));
    }

    #[test]
    fn request_message_has_no_date() {
        let sink = WireSink::default();
        let wire = Rc::clone(&sink.0);
        let mut req = OutgoingMessage::request(Method::POST, "/upload", FramingConfig::default(), Box::new(sink));
        req.set_header("Host", "example.com").unwrap();
        req.write("abc", None).unwrap();
        req.end(None, None).unwrap();

        assert_eq!(
            wire_text(&wire),
            "POST /upload HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\nTransfer-Encoding: chunked\r\n\r\n\
             3\r\nabc\r\n0\r\n\r\n"
        );
        assert_eq!(req.status_code(), None);
    }

    #[test]
    fn date_is_stamped_unless_removed() {
        let (mut res, _wire) = response(FramingConfig::default());
        res.end(None, None).unwrap();
        assert!(res.sent_head().unwrap().get("date").is_some());

        let (mut res, _wire) = response(FramingConfig::default());
        res.remove_header("Date").unwrap();
        res.end(None, None).unwrap();
        assert!(res.sent_head().unwrap().get("date").is_none());
    }

    #[test]
    fn high_water_mark_asks_to_pause() {
        let (mut res, _wire) = response(no_date().with_high_water_mark(4));
        res.cork();
        assert!(!res.write("hello", None).unwrap());
        assert!(res.writable_need_drain());
        assert!(res.writable_length() >= 5);
    }

    #[test]
    fn destroy_fails_pending_writes_and_later_ones() {
        let (mut res, wire) = response(no_date());
        res.cork();
        let (results, callback) = recorder();
        res.write("pending", Some(callback)).unwrap();

        res.destroy(None);
        res.destroy(Some(HttpError::ConsumerAbort));
        assert_eq!(*results.borrow(), vec![Err(HttpError::from(StateError::destroyed("write")))]);
        assert_eq!(wire.borrow().error, Some(StateError::destroyed("write").into()));

        assert_eq!(res.write("more", None), Err(StateError::destroyed("write").into()));
    }

    #[test]
    fn aborted_consumer_rejects_writes() {
        let (mut res, wire) = response(no_date());
        res.write("first", None).unwrap();
        wire.borrow_mut().aborted = true;
        assert_eq!(res.write("second", None), Err(HttpError::ConsumerAbort));
    }

    #[test]
    fn text_encodings_are_applied() {
        let (mut res, wire) = response(no_date());
        res.write(Chunk::text("aGk=", Encoding::Base64), None).unwrap();
        res.write(Chunk::text("\u{e9}", Encoding::Latin1), None).unwrap();
        assert_eq!(&wire.borrow().body[..], b"hi\xe9");

        let err = res.write(Chunk::text("!!", Encoding::Base64), None).unwrap_err();
        assert!(matches!(err, HttpError::Validation { source: ValidationError::InvalidEncoding { .. } }));
    }
}
