//! The "perform one HTTP exchange" collaborator.
//!
//! [`Transport`] is the seam between the dispatcher and the network. The
//! dispatcher owns the pool lease and the overall deadline; a transport only
//! dials, writes the request and reads the full response.
//!
//! [`HttpTransport`] is the built-in implementation: a fresh TCP connection
//! per lease and a hyper HTTP/1.1 exchange over it. Wire-level events are
//! traced under the `dispatchnet::wire` target.

use crate::base::dispatcherror::DispatchError;
use crate::base::loadstate::{LoadState, LoadStateCell};
use crate::base::neterror::NetError;
use crate::http::request::RequestDescriptor;
use crate::http::response::HttpResponse;
use crate::socket::connectjob::ConnectJob;
use crate::socket::pool::{DestinationKey, LeaseId};
use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A pending exchange.
pub type Exchange = Pin<Box<dyn Future<Output = Result<HttpResponse, DispatchError>> + Send>>;

/// What the dispatcher hands to a transport alongside the descriptor.
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    pub request_id: u64,
    pub destination: DestinationKey,
    pub lease: LeaseId,
    /// Effective connect deadline after applying dispatcher defaults.
    pub connect_timeout: Option<Duration>,
    pub load_state: LoadStateCell,
}

/// Performs one HTTP exchange for a leased destination.
///
/// Implementations must be cancel-safe: the dispatcher drops the returned
/// future on cancellation or deadline, and nothing may outlive it.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: Arc<RequestDescriptor>, ctx: ExchangeContext) -> Exchange;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: Arc<RequestDescriptor>, ctx: ExchangeContext) -> Exchange {
        (**self).execute(request, ctx)
    }
}

/// HTTP/1.1 over plain TCP, one connection per exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    max_body_bytes: Option<usize>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail responses whose body grows beyond `limit` bytes.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: Arc<RequestDescriptor>, ctx: ExchangeContext) -> Exchange {
        Box::pin(exchange(request, ctx, self.max_body_bytes))
    }
}

fn build_request(request: &RequestDescriptor) -> Result<Request<Full<Bytes>>, NetError> {
    let mut builder = Request::builder()
        .method(request.method().clone())
        .uri(request.origin_form());

    let headers = request.headers();
    if !headers.contains("Host") {
        builder = builder.header(http::header::HOST, request.host_header());
    }
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }

    let body = request.body().cloned().unwrap_or_default();
    builder.body(Full::new(body)).map_err(|_| NetError::InvalidUrl)
}

async fn exchange(
    request: Arc<RequestDescriptor>,
    ctx: ExchangeContext,
    max_body_bytes: Option<usize>,
) -> Result<HttpResponse, DispatchError> {
    ctx.load_state.set(LoadState::Connecting);
    let stream = ConnectJob::connect(&ctx.destination, ctx.connect_timeout).await?;

    let (sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| NetError::from(&e))?;

    let req = build_request(&request)?;
    tracing::debug!(
        target: "dispatchnet::wire",
        request_id = ctx.request_id,
        lease = ctx.lease,
        "{} {} {:?}",
        req.method(),
        request.url(),
        req.version()
    );
    for (name, value) in req.headers() {
        tracing::trace!(target: "dispatchnet::wire", request_id = ctx.request_id, ">> {}: {:?}", name, value);
    }

    let work = send_and_read(sender, req, ctx.load_state.clone(), ctx.request_id, max_body_bytes);

    // The connection is driven in this future, dropping it closes the socket.
    tokio::pin!(conn);
    tokio::pin!(work);
    tokio::select! {
        biased;
        result = &mut work => result,
        closed = &mut conn => match closed {
            Err(e) => Err(NetError::from(&e).into()),
            Ok(()) => work.await,
        },
    }
}

async fn send_and_read(
    mut sender: http1::SendRequest<Full<Bytes>>,
    req: Request<Full<Bytes>>,
    state: LoadStateCell,
    request_id: u64,
    max_body_bytes: Option<usize>,
) -> Result<HttpResponse, DispatchError> {
    state.set(LoadState::SendingRequest);
    let pending = sender.send_request(req);
    state.set(LoadState::WaitingForResponse);
    let response = pending.await.map_err(|e| NetError::from(&e))?;

    state.set(LoadState::ReadingResponse);
    let (parts, mut body) = response.into_parts();
    tracing::debug!(target: "dispatchnet::wire", request_id, status = %parts.status, "response head");

    let mut collected = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| {
            tracing::debug!(target: "dispatchnet::wire", request_id, error = %e, "body read failed");
            NetError::from(&e)
        })?;
        if let Ok(data) = frame.into_data() {
            collected.extend_from_slice(&data);
            if max_body_bytes.is_some_and(|limit| collected.len() > limit) {
                return Err(NetError::InvalidResponse.into());
            }
        }
    }
    tracing::trace!(target: "dispatchnet::wire", request_id, bytes = collected.len(), "body complete");
    Ok(HttpResponse::from_parts(parts, Bytes::from(collected)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_adds_host() {
        let request = RequestDescriptor::post("http://example.com:8080/submit?x=1")
            .header("X-Dup", "1")
            .header("X-Dup", "2")
            .body("payload")
            .build()
            .unwrap();

        let req = build_request(&request).unwrap();
        assert_eq!(req.uri(), "/submit?x=1");
        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(req.headers().get(http::header::HOST).unwrap(), "example.com:8080");
        assert_eq!(req.headers().get_all("x-dup").iter().count(), 2);
    }

    #[test]
    fn test_build_request_keeps_explicit_host() {
        let request = RequestDescriptor::get("http://127.0.0.1:9/")
            .header("Host", "virtual.example")
            .build()
            .unwrap();
        let req = build_request(&request).unwrap();
        assert_eq!(req.headers().get_all(http::header::HOST).iter().count(), 1);
        assert_eq!(req.headers().get(http::header::HOST).unwrap(), "virtual.example");
    }
}
