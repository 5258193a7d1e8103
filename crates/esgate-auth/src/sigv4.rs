//! SigV4 signature computation.
//!
//! Implements the signing side of AWS Signature Version 4: canonical request,
//! string to sign, signing key derivation, and the final `Authorization`
//! header. The entry point is [`sign_request`], a pure function of its
//! inputs: it reads no clock and holds no state, so it is safe to call
//! concurrently and trivially deterministic under test.
//!
//! The signed header set is deliberately minimal: `host`, `x-amz-date`, and
//! `x-amz-security-token` when a session token is present. Signing additional
//! forwarded headers would change verification outcomes on the upstream side,
//! so the set must not grow without confirming the upstream's expectations.

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canonical::{build_canonical_headers, build_canonical_request};
use crate::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// The SigV4 algorithm identifier used in the string to sign and the
/// `Authorization` header.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Timestamp format for `X-Amz-Date` (ISO 8601 basic, UTC).
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Date-only format used in the credential scope.
const DATE_FORMAT: &str = "%Y%m%d";

/// The request-shaped inputs to a signing call.
///
/// `path` and `query` are taken from the inbound request as received; the
/// canonicalization in [`crate::canonical`] normalizes the query encoding
/// and escapes the path once more without decoding it.
/// `host` must be the upstream hostname the request is sent to, never the
/// client's `Host` header.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// HTTP method, uppercase.
    pub method: &'a str,
    /// Request path as received.
    pub path: &'a str,
    /// Raw query string without the leading `?`, empty if none.
    pub query: &'a str,
    /// Destination host header value (including a non-default port).
    pub host: &'a str,
    /// AWS region of the upstream.
    pub region: &'a str,
    /// Signing service name (`es` for OpenSearch/Elasticsearch domains).
    pub service: &'a str,
}

/// The headers produced by one signing call.
///
/// Computed fresh per request and never reused: the timestamp and path vary,
/// and a signature is only valid within a short window.
#[derive(Debug, Clone)]
pub struct SignedHeaderSet {
    /// `Host` header value (the upstream host).
    pub host: String,
    /// `X-Amz-Date` header value, matching the timestamp inside the signature.
    pub amz_date: String,
    /// Full `Authorization` header value.
    pub authorization: String,
    /// `X-Amz-Security-Token` value when the credentials carry a session token.
    pub security_token: Option<String>,
}

impl SignedHeaderSet {
    /// The headers as `(name, value)` pairs in emission order.
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("host", self.host.as_str()),
            ("x-amz-date", self.amz_date.as_str()),
            ("authorization", self.authorization.as_str()),
        ];
        if let Some(token) = &self.security_token {
            pairs.push(("x-amz-security-token", token.as_str()));
        }
        pairs
    }
}

/// Lowercase hex SHA-256 digest of a request payload.
///
/// An empty body hashes the empty string
/// (`e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`).
#[must_use]
pub fn hash_payload(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Derive the SigV4 signing key via nested HMAC-SHA256.
///
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign a fully buffered request, producing the header set to attach before
/// forwarding.
///
/// `now` must be read once per request by the caller and threaded through,
/// so the `X-Amz-Date` header and the timestamp inside the signature cannot
/// disagree.
#[must_use]
pub fn sign_request(
    params: &SigningParams<'_>,
    body: &[u8],
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> SignedHeaderSet {
    let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
    let date = now.format(DATE_FORMAT).to_string();

    let mut headers: Vec<(&str, &str)> =
        vec![("host", params.host), ("x-amz-date", &amz_date)];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.as_str()));
    }
    let (canonical_headers, signed_headers) = build_canonical_headers(&headers);

    let payload_hash = hash_payload(body);
    let canonical_request = build_canonical_request(
        params.method,
        params.path,
        params.query,
        &canonical_headers,
        &signed_headers,
        &payload_hash,
    );

    let scope = format!("{date}/{}/{}/aws4_request", params.region, params.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = derive_signing_key(
        &credentials.secret_access_key,
        &date,
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    debug!(
        method = params.method,
        path = params.path,
        signed_headers = %signed_headers,
        "computed SigV4 signature"
    );

    SignedHeaderSet {
        host: params.host.to_owned(),
        amz_date,
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        security_token: credentials.session_token.clone(),
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
