//! The inbound half of an exchange: request line, raw fields and a body source.
//!
//! Field views are folded lazily. The first call to [`IncomingMessage::headers`]
//! (or one of its siblings) folds the raw list and caches the result until the
//! raw list changes.

use bytes::{Buf, Bytes};
use http::{HeaderMap, Method, Request, Version};
use http_body::Body;
use http_body_util::BodyExt;
use once_cell::unsync::OnceCell;
use tracing::{debug, trace};

use crate::codec::header::{DistinctHeaders, FoldedHeaders, HeaderFolder, IncomingHead, RawHeaderList};
use crate::protocol::HttpError;
use crate::protocol::chunk::latin1_string;

#[derive(Debug)]
pub struct IncomingMessage<B> {
    method: Method,
    url: String,
    version: Version,
    raw_headers: RawHeaderList,
    raw_trailers: RawHeaderList,
    body: Option<B>,
    complete: bool,
    aborted: bool,

    headers: OnceCell<FoldedHeaders>,
    headers_distinct: OnceCell<DistinctHeaders>,
    trailers: OnceCell<FoldedHeaders>,
    trailers_distinct: OnceCell<DistinctHeaders>,
}

impl<B> IncomingMessage<B> {
    /// Creates a message from its parts. `body` is `None` for requests without one.
    pub fn new(method: Method, url: impl Into<String>, version: Version, raw_headers: RawHeaderList, body: Option<B>) -> Self {
        Self {
            method,
            url: url.into(),
            version,
            raw_headers,
            raw_trailers: Vec::new(),
            body,
            complete: false,
            aborted: false,
            headers: OnceCell::new(),
            headers_distinct: OnceCell::new(),
            trailers: OnceCell::new(),
            trailers_distinct: OnceCell::new(),
        }
    }

    /// Pairs a decoded head with the body that follows it.
    pub fn from_head(head: IncomingHead, body: Option<B>) -> Self {
        Self::new(head.method, head.url, head.version, head.raw_headers, body)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path and query of the request target.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Fields as received, wire casing and order kept.
    pub fn raw_headers(&self) -> &[(String, String)] {
        &self.raw_headers
    }

    pub fn raw_trailers(&self) -> &[(String, String)] {
        &self.raw_trailers
    }

    /// The body has been read to its end.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The message was destroyed before its body completed.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn headers(&self) -> &FoldedHeaders {
        self.headers.get_or_init(|| HeaderFolder::fold(&self.raw_headers))
    }

    pub fn headers_distinct(&self) -> &DistinctHeaders {
        self.headers_distinct.get_or_init(|| HeaderFolder::fold_distinct(&self.raw_headers))
    }

    pub fn trailers(&self) -> &FoldedHeaders {
        self.trailers.get_or_init(|| HeaderFolder::fold(&self.raw_trailers))
    }

    pub fn trailers_distinct(&self) -> &DistinctHeaders {
        self.trailers_distinct.get_or_init(|| HeaderFolder::fold_distinct(&self.raw_trailers))
    }

    /// Replaces the folded view. The raw list is left alone.
    pub fn set_headers(&mut self, headers: FoldedHeaders) {
        self.headers = OnceCell::from(headers);
    }

    /// Drops every cached view so the next access folds again.
    pub fn reset_headers(&mut self) {
        self.headers.take();
        self.headers_distinct.take();
        self.trailers.take();
        self.trailers_distinct.take();
    }

    /// Adds raw field lines: to the headers while the body is still being
    /// read, to the trailers once it has completed.
    pub fn add_header_lines<I, N, V>(&mut self, lines: I)
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let lines = lines.into_iter().map(|(n, v)| (n.into(), v.into()));
        if self.complete {
            self.raw_trailers.extend(lines);
            self.trailers.take();
            self.trailers_distinct.take();
        } else {
            self.raw_headers.extend(lines);
            self.headers.take();
            self.headers_distinct.take();
        }
    }

    /// Marks the message aborted unless its body already completed. The body
    /// source is dropped.
    pub fn destroy(&mut self) {
        if !self.complete && !self.aborted {
            debug!(method = %self.method, url = %self.url, "incoming message destroyed before completion");
            self.aborted = true;
        }
        self.body = None;
    }

    fn record_trailers(&mut self, trailers: &HeaderMap) {
        self.raw_trailers.extend(trailers.iter().map(|(name, value)| (name.as_str().to_owned(), latin1_string(value.as_bytes()))));
        self.trailers.take();
        self.trailers_distinct.take();
    }
}

impl<B> IncomingMessage<B>
where
    B: Body + Unpin,
    B::Error: std::fmt::Display,
{
    /// Pulls the next chunk of the body.
    ///
    /// Trailer frames are recorded as raw trailers. `Ok(None)` marks the end of
    /// the body, after which the message is complete.
    ///
    /// # Errors
    ///
    /// [`HttpError::Source`] when the body source fails.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        loop {
            let Some(body) = self.body.as_mut() else {
                self.complete = !self.aborted;
                return Ok(None);
            };

            match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(mut data) => {
                        let bytes = data.copy_to_bytes(data.remaining());
                        trace!(size = bytes.len(), "read body chunk");
                        return Ok(Some(bytes));
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            self.record_trailers(&trailers);
                        }
                    }
                },
                Some(Err(e)) => {
                    self.body = None;
                    return Err(HttpError::source_failed(e));
                }
                None => {
                    self.body = None;
                    self.complete = true;
                    return Ok(None);
                }
            }
        }
    }
}

impl<B> From<Request<B>> for IncomingMessage<B> {
    fn from(request: Request<B>) -> Self {
        let (parts, body) = request.into_parts();
        let url = parts.uri.path_and_query().map_or("/", |pq| pq.as_str()).to_owned();
        let raw_headers =
            parts.headers.iter().map(|(name, value)| (name.as_str().to_owned(), latin1_string(value.as_bytes()))).collect();
        Self::new(parts.method, url, parts.version, raw_headers, Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::FieldValue;
    use http_body_util::{Empty, Full, StreamBody};
    use http_body::Frame;

    fn request_with(headers: &[(&str, &str)]) -> IncomingMessage<Empty<Bytes>> {
        let raw = headers.iter().map(|(n, v)| ((*n).to_owned(), (*v).to_owned())).collect();
        IncomingMessage::new(Method::GET, "/", Version::HTTP_11, raw, None)
    }

    #[test]
    fn views_are_folded_lazily_and_cached() {
        let mut message = request_with(&[("Accept", "a"), ("accept", "b"), ("Set-Cookie", "x"), ("Set-Cookie", "y")]);

        assert_eq!(message.headers().get_str("accept"), Some("a, b"));
        assert_eq!(message.headers_distinct().get("accept"), Some(&["a".to_owned(), "b".to_owned()][..]));
        assert_eq!(message.headers().get("set-cookie"), Some(&FieldValue::List(vec!["x".into(), "y".into()])));

        message.add_header_lines([("Accept", "c")]);
        assert_eq!(message.headers().get_str("accept"), Some("a, b, c"));
    }

    #[test]
    fn set_and_reset_headers() {
        let mut message = request_with(&[("Host", "example.com")]);

        let mut replaced = FoldedHeaders::new();
        replaced.insert("host", FieldValue::Single("other.example".into()));
        message.set_headers(replaced);
        assert_eq!(message.headers().get_str("host"), Some("other.example"));

        message.reset_headers();
        assert_eq!(message.headers().get_str("host"), Some("example.com"));
    }

    #[test]
    fn from_http_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("https://example.com/path?q=1")
            .header("x-one", "1")
            .header("x-one", "2")
            .body(Empty::<Bytes>::new())
            .unwrap();

        let message = IncomingMessage::from(request);
        assert_eq!(message.method(), &Method::POST);
        assert_eq!(message.url(), "/path?q=1");
        assert_eq!(message.headers().get_str("x-one"), Some("1"));
        assert_eq!(message.headers_distinct().get("X-One"), Some(&["1".to_owned(), "2".to_owned()][..]));
    }

    #[tokio::test]
    async fn read_body_to_completion() {
        let request = Request::builder().method(Method::POST).uri("/").body(Full::new(Bytes::from_static(b"hello"))).unwrap();
        let mut message = IncomingMessage::from(request);

        assert_eq!(message.read_chunk().await, Ok(Some(Bytes::from_static(b"hello"))));
        assert!(!message.is_complete());
        assert_eq!(message.read_chunk().await, Ok(None));
        assert!(message.is_complete());

        message.add_header_lines([("X-Checksum", "abc")]);
        assert_eq!(message.trailers().get_str("x-checksum"), Some("abc"));
        assert!(message.headers().get("x-checksum").is_none());
    }

    #[tokio::test]
    async fn trailer_frames_are_recorded() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-digest", "sha".parse().unwrap());
        let frames: Vec<Result<Frame<Bytes>, std::convert::Infallible>> =
            vec![Ok(Frame::data(Bytes::from_static(b"a"))), Ok(Frame::trailers(trailers))];
        let body = StreamBody::new(futures::stream::iter(frames));

        let mut message = IncomingMessage::new(Method::POST, "/", Version::HTTP_11, Vec::new(), Some(body));
        assert_eq!(message.read_chunk().await, Ok(Some(Bytes::from_static(b"a"))));
        assert_eq!(message.read_chunk().await, Ok(None));
        assert_eq!(message.trailers().get_str("x-digest"), Some("sha"));
    }

    #[tokio::test]
    async fn missing_body_completes_at_once() {
        let mut message = request_with(&[]);
        assert_eq!(message.read_chunk().await, Ok(None));
        assert!(message.is_complete());
    }

    #[test]
    fn destroy_before_completion_aborts() {
        let mut message = request_with(&[]);
        message.destroy();
        assert!(message.is_aborted());
    }
}
