//! The esgate proxy pipeline: capture, sign, forward.
//!
//! Every inbound request runs through an explicit, ordered pipeline inside
//! [`service::GatewayService`]:
//!
//! 1. basic-auth gate (when configured),
//! 2. health-check short-circuit (when configured),
//! 3. full body capture, bounded by the configured size limit,
//! 4. credential readiness via [`esgate_auth::CredentialCache`],
//! 5. SigV4 signing with a clock read once per request,
//! 6. forwarding to the single fixed upstream with the response streamed
//!    back to the client.
//!
//! The request body is fully materialized before signing because the
//! signature covers a hash of the complete payload and the same bytes must
//! be re-sent upstream; the response is never buffered.
//!
//! # Modules
//!
//! - [`assets`] - static-asset cache-control policy
//! - [`body`] - type-erased response body helpers
//! - [`capture`] - bounded request body buffering
//! - [`config`] - upstream target, region inference, proxy configuration
//! - [`error`] - per-request error taxonomy and status mapping
//! - [`forward`] - the upstream forwarding engine
//! - [`service`] - the hyper service composing the pipeline

pub mod assets;
pub mod body;
pub mod capture;
pub mod config;
pub mod error;
pub mod forward;
pub mod service;

pub use config::{BasicAuth, ConfigError, ProxyConfig, UpstreamTarget};
pub use error::ProxyError;
pub use forward::ForwardingEngine;
pub use service::GatewayService;
