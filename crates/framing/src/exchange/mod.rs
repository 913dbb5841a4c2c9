//! Turns an [`http::Request`] into an incoming/outgoing message pair, and the
//! outgoing message back into an [`http::Response`].
//!
//! ```
//! use bytes::Bytes;
//! use http_body_util::Empty;
//! use micro_http_framing::exchange::to_req_res;
//! use micro_http_framing::protocol::FramingConfig;
//!
//! # async fn run() -> Result<(), micro_http_framing::protocol::HttpError> {
//! let request = http::Request::get("https://example.com/hello").body(Empty::<Bytes>::new()).unwrap();
//! let mut exchange = to_req_res(request, FramingConfig::default());
//!
//! exchange.response.set_header("Content-Type", "text/plain")?;
//! exchange.response.end(Some("hello".into()), None)?;
//!
//! let response = exchange.pending.await?;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use http::{Request, Response, StatusCode};
use tracing::debug;

use crate::connection::{BodyStream, BridgeMode, OutgoingMessage, StreamBridge};
use crate::protocol::{FramingConfig, HttpError, IncomingMessage, SentHead, ValidationError};

/// One request and the response being written for it.
#[derive(Debug)]
pub struct Exchange<B> {
    pub request: IncomingMessage<B>,
    pub response: OutgoingMessage,
    /// Resolves once the response head has been rendered and sent.
    pub pending: PendingResponse,
}

/// Splits `request` into an [`IncomingMessage`] and a response whose body is
/// surfaced without framing.
pub fn to_req_res<B>(request: Request<B>, config: FramingConfig) -> Exchange<B> {
    to_req_res_with_mode(request, config, BridgeMode::Body)
}

/// Like [`to_req_res`], with the bridge in `mode`. In [`BridgeMode::Wire`] the
/// response body carries the whole message as it would go on the wire.
pub fn to_req_res_with_mode<B>(request: Request<B>, config: FramingConfig, mode: BridgeMode) -> Exchange<B> {
    let request = IncomingMessage::from(request);
    let (bridge, sink) = StreamBridge::new(mode);
    let response = OutgoingMessage::response(&request, config, Box::new(sink));
    debug!(method = %request.method(), url = request.url(), "new exchange");
    Exchange { request, response, pending: PendingResponse { bridge } }
}

/// The [`http::Response`] of an [`Exchange`], available once its head is sent.
///
/// The response carries the [`SentHead`] in its extensions, which keeps the
/// reason phrase and lets repeated fields be read joined or one by one.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct PendingResponse {
    bridge: StreamBridge,
}

impl PendingResponse {
    pub fn bridge(&self) -> &StreamBridge {
        &self.bridge
    }
}

impl Future for PendingResponse {
    type Output = Result<Response<BodyStream>, HttpError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let head = ready!(self.bridge.poll_head(cx))?;
        let body = self.bridge.attach()?;
        Poll::Ready(build_response(head, body))
    }
}

fn build_response(head: SentHead, body: BodyStream) -> Result<Response<BodyStream>, HttpError> {
    let code = head.status().unwrap_or_default();
    let Ok(status) = StatusCode::from_u16(code) else {
        return Err(ValidationError::invalid_status_code(u32::from(code)).into());
    };
    let headers = head.to_header_map()?;

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response.extensions_mut().insert(head);
    Ok(response)
}
