use crate::errors::GatewayError;
use crate::metrics_defs::UPSTREAM_REQUEST_DURATION;
use http::StatusCode;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::histogram;
use shared::http::{add_via_header, filter_hop_by_hop, make_error_response};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use url::Url;

type ForwardResponse = Response<BoxBody<Bytes, GatewayError>>;

/// Final stage of the gateway: sends requests on to a single upstream.
///
/// The upstream path and query are taken from the inbound request. Upstream
/// failures are answered with 502, and 504 when no response headers arrive
/// within the timeout. The timeout does not cover streaming the body.
pub struct Forwarder<B = Incoming> {
    client: Client<HttpConnector, B>,
    upstream: Url,
    timeout: Duration,
}

impl<B> Clone for Forwarder<B> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            upstream: self.upstream.clone(),
            timeout: self.timeout,
        }
    }
}

impl<B> Forwarder<B>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    pub fn new(upstream: Url, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            upstream,
            timeout,
        }
    }

    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, GatewayError> {
        let mut url = self.upstream.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());

        url.as_str()
            .parse()
            .map_err(|e| GatewayError::InternalError(format!("Invalid upstream URI: {e}")))
    }

    async fn forward(&self, request: Request<B>) -> ForwardResponse {
        let (mut parts, body) = request.into_parts();

        parts.uri = match self.upstream_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(error = %e, "Could not build upstream request");
                return make_error_response(StatusCode::BAD_GATEWAY);
            }
        };
        let version = parts.version;
        filter_hop_by_hop(&mut parts.headers, version);
        add_via_header(&mut parts.headers, version);

        let start = Instant::now();
        let result = timeout(self.timeout, self.client.request(Request::from_parts(parts, body)))
            .await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(upstream = %self.upstream, error = %e, "Upstream request failed");
                histogram!(UPSTREAM_REQUEST_DURATION, "status" => "error").record(elapsed);
                return make_error_response(StatusCode::BAD_GATEWAY);
            }
            Err(_) => {
                tracing::warn!(upstream = %self.upstream, timeout = ?self.timeout, "Upstream timed out");
                histogram!(UPSTREAM_REQUEST_DURATION, "status" => "timeout").record(elapsed);
                return make_error_response(StatusCode::GATEWAY_TIMEOUT);
            }
        };

        histogram!(
            UPSTREAM_REQUEST_DURATION,
            "status" => response.status().as_u16().to_string()
        )
        .record(elapsed);

        let (mut parts, body) = response.into_parts();
        let version = parts.version;
        filter_hop_by_hop(&mut parts.headers, version);
        add_via_header(&mut parts.headers, version);

        Response::from_parts(parts, body.map_err(GatewayError::from).boxed())
    }
}

impl<B> Service<Request<B>> for Forwarder<B>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = ForwardResponse;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let forwarder = self.clone();
        Box::pin(async move { Ok(forwarder.forward(req).await) })
    }
}
