//! Type-erased HTTP response bodies.
//!
//! The gateway returns either small fixed bodies (errors, health checks) or
//! a live stream relayed from the upstream; both are erased to one boxed
//! body type so hyper can handle them uniformly.

use std::convert::Infallible;
use std::io;

use bytes::Bytes;
use futures::StreamExt;
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};

/// Type-erased response body used by the gateway.
pub type ProxyBody = UnsyncBoxBody<Bytes, io::Error>;

/// A body holding one fixed chunk.
pub fn full_body(content: impl Into<Bytes>) -> ProxyBody {
    Full::new(content.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// An empty body.
#[must_use]
pub fn empty_body() -> ProxyBody {
    Empty::new()
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// Relay an upstream response body as a stream of frames, without buffering.
#[must_use]
pub fn streaming_body(response: reqwest::Response) -> ProxyBody {
    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map(Frame::data).map_err(io::Error::other));
    StreamBody::new(stream).boxed_unsync()
}
