//! The gateway service composing the proxy pipeline.
//!
//! One [`GatewayService`] instance serves all connections. Each request runs
//! through an explicit, ordered pipeline: basic-auth gate, health-check
//! short-circuit, body capture, credential readiness, signing, forwarding.
//! Per-request failures map to a status via [`ProxyError::status`] and never
//! affect other in-flight requests.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use http::header::{HeaderMap, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use esgate_auth::{CredentialCache, SigningParams, sign_request};

use crate::body::{ProxyBody, full_body};
use crate::capture::capture;
use crate::config::{BasicAuth, ProxyConfig};
use crate::error::ProxyError;
use crate::forward::ForwardingEngine;

/// The hyper service handling every inbound request.
///
/// Cheap to clone; all state is shared behind one `Arc`.
#[derive(Debug, Clone)]
pub struct GatewayService {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ProxyConfig,
    credentials: CredentialCache,
    engine: ForwardingEngine,
}

impl GatewayService {
    /// Compose the pipeline from its parts.
    #[must_use]
    pub fn new(config: ProxyConfig, credentials: CredentialCache, engine: ForwardingEngine) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                credentials,
                engine,
            }),
        }
    }

    /// Run one request through the pipeline, always producing a response.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(gate) = &self.inner.config.basic_auth {
            if !authorized(gate, req.headers()) {
                debug!(path = req.uri().path(), "rejecting unauthenticated request");
                return unauthorized_response();
            }
        }

        if let Some(health_path) = &self.inner.config.health_path {
            if req.method() == Method::GET && req.uri().path() == health_path {
                return health_response();
            }
        }

        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        match self.proxy(req).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%method, %path, error = %e, "request failed");
                error_response(&e)
            }
        }
    }

    /// Capture, check credentials, sign, forward.
    async fn proxy<B>(&self, req: Request<B>) -> Result<Response<ProxyBody>, ProxyError>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = capture(body, self.inner.config.body_limit).await?;

        let credentials = self.inner.credentials.resolve().await?;

        let target = self.inner.engine.target();
        let host = target.host_header();
        // Read the clock once so the date header and the signature agree.
        let signed = sign_request(
            &SigningParams {
                method: parts.method.as_str(),
                path: parts.uri.path(),
                query: parts.uri.query().unwrap_or(""),
                host: &host,
                region: &target.region,
                service: &target.service,
            },
            &body,
            &credentials,
            Utc::now(),
        );

        self.inner.engine.forward(&parts, body, &signed).await
    }
}

impl<B> hyper::service::Service<Request<B>> for GatewayService
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<ProxyBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

/// Check a `Basic` authorization header against the configured gate, in
/// constant time for both fields.
fn authorized(gate: &BasicAuth, headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, password)) = decoded.split_once(':') else {
        return false;
    };

    let user_ok = user.as_bytes().ct_eq(gate.user.as_bytes());
    let password_ok = password.as_bytes().ct_eq(gate.password.as_bytes());
    (user_ok & password_ok).into()
}

fn unauthorized_response() -> Response<ProxyBody> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"esgate\""),
        )
        .body(full_body("unauthorized"))
        .expect("static response parts are valid")
}

fn health_response() -> Response<ProxyBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        )
        .body(full_body("ok"))
        .expect("static response parts are valid")
}

fn error_response(e: &ProxyError) -> Response<ProxyBody> {
    Response::builder()
        .status(e.status())
        .header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        )
        .body(full_body(e.to_string()))
        .expect("static response parts are valid")
}
