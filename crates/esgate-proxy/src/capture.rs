//! Bounded request body buffering.
//!
//! The inbound body must be fully materialized before signing: the SigV4
//! canonical request includes a hash of the complete payload, and the exact
//! same bytes must be re-sent upstream. A transport stream can only be
//! consumed once, so "hash now, rewind later" is not an option. Memory use
//! is bounded by the configured limit via `http_body_util::Limited`.

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::error::ProxyError;

/// Read an entire request body into memory, rejecting bodies over `limit`
/// bytes before any further processing.
///
/// Requests without a payload capture as empty bytes; signing still proceeds
/// with the empty-string hash.
///
/// # Errors
///
/// [`ProxyError::PayloadTooLarge`] when the body exceeds `limit`, or
/// [`ProxyError::BodyRead`] when the client connection fails mid-body.
pub async fn capture<B>(body: B, limit: usize) -> Result<Bytes, ProxyError>
where
    B: http_body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ProxyError::PayloadTooLarge { limit })
        }
        Err(e) => Err(ProxyError::BodyRead(e)),
    }
}
