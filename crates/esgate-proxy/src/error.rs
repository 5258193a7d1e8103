//! Per-request error taxonomy and HTTP status mapping.
//!
//! Every variant is isolated to one request: nothing here aborts the process
//! or affects concurrent requests. A request either is fully forwarded and
//! its response relayed, or it fails before any upstream bytes are sent.

use http::StatusCode;

use esgate_auth::CredentialError;

/// Errors produced by the proxy pipeline for a single request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The inbound body exceeded the configured limit. Rejected before
    /// signing; no upstream call is made.
    #[error("request body exceeds the configured limit of {limit} bytes")]
    PayloadTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The inbound body could not be read from the client.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Credential refresh failed for this request; the next request retries.
    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),

    /// A signed header value could not be encoded into the outbound request.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    /// The upstream HTTP client could not be constructed at startup.
    #[error("failed to build upstream client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The upstream could not be reached. Not retried: the request may carry
    /// a non-idempotent method and a signature tied to a timestamp.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    /// The upstream exchange timed out. Not retried, same as unreachable.
    #[error("upstream timed out: {0}")]
    UpstreamTimeout(#[source] reqwest::Error),
}

impl ProxyError {
    /// The HTTP status relayed to the client for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Credentials(_) | Self::ClientBuild(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_errors_to_statuses() {
        assert_eq!(
            ProxyError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::Credentials(CredentialError::Unavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::InvalidRequest("bad header".to_owned()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
