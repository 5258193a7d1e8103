//! The upstream forwarding engine.
//!
//! Opens (or reuses, via the client's connection pool) a connection to the
//! single configured upstream, attaches the freshly signed headers, sends
//! the captured body verbatim, and relays the response with its body
//! streamed frame-by-frame. TLS verification stays enabled for https
//! origins, and failed exchanges are never retried: the request may carry a
//! non-idempotent method and a signature tied to a specific timestamp.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use tracing::{debug, warn};

use esgate_auth::SignedHeaderSet;

use crate::assets::{STATIC_CACHE_CONTROL, is_static_asset};
use crate::body::{ProxyBody, streaming_body};
use crate::config::{ProxyConfig, UpstreamTarget};
use crate::error::ProxyError;

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers owned by the proxy on the outbound side: either replaced by the
/// signed header set or recomputed by the client from the buffered body.
const PROXY_MANAGED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "authorization",
    "x-amz-date",
    "x-amz-security-token",
];

/// Forwards signed requests to the fixed upstream origin.
#[derive(Debug, Clone)]
pub struct ForwardingEngine {
    client: reqwest::Client,
    target: UpstreamTarget,
}

impl ForwardingEngine {
    /// Build an engine with a pooled client for `target`.
    pub fn new(target: UpstreamTarget, config: &ProxyConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.upstream_timeout)
            .build()
            .map_err(ProxyError::ClientBuild)?;
        Ok(Self { client, target })
    }

    /// The configured upstream target.
    #[must_use]
    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Send one captured request upstream and relay the response.
    ///
    /// The method, path, and query are passed through exactly as received;
    /// the client's headers are copied with the signed set taking precedence.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UpstreamTimeout`] or [`ProxyError::UpstreamUnreachable`]
    /// when the exchange fails before a response arrives.
    pub async fn forward(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
        signed: &SignedHeaderSet,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or("/", http::uri::PathAndQuery::as_str);
        let url = format!("{}{path_and_query}", self.target.origin());

        let mut headers = HeaderMap::new();
        for (name, value) in &parts.headers {
            if is_hop_by_hop(name) || is_proxy_managed(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        for (name, value) in signed.header_pairs() {
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProxyError::InvalidRequest(format!("header {name}: {e}")))?;
            headers.insert(
                HeaderName::from_static(name),
                value,
            );
        }

        debug!(method = %parts.method, %url, "forwarding signed request");
        let upstream = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(classify_send_error)?;

        Ok(relay_response(parts.uri.path(), upstream))
    }
}

/// Turn an upstream reqwest response into the response relayed to the
/// client, applying the static-asset cache-control override.
fn relay_response(request_path: &str, upstream: reqwest::Response) -> Response<ProxyBody> {
    let status = upstream.status();
    let mut builder = Response::builder().status(status);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        if is_static_asset(request_path) {
            headers.insert(
                http::header::CACHE_CONTROL,
                HeaderValue::from_static(STATIC_CACHE_CONTROL),
            );
        }
    }

    builder
        .body(streaming_body(upstream))
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to assemble relayed response");
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(crate::body::empty_body())
                .expect("static response parts are valid")
        })
}

fn classify_send_error(e: reqwest::Error) -> ProxyError {
    if e.is_timeout() {
        ProxyError::UpstreamTimeout(e)
    } else {
        ProxyError::UpstreamUnreachable(e)
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn is_proxy_managed(name: &HeaderName) -> bool {
    PROXY_MANAGED_HEADERS.contains(&name.as_str())
}
