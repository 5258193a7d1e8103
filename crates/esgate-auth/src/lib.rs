//! AWS Signature Version 4 request signing and credential resolution for esgate.
//!
//! This crate implements the client side of SigV4: given a fully buffered
//! request and a set of AWS credentials, it produces the `Authorization`,
//! `X-Amz-Date`, `Host`, and (when a session token is present)
//! `X-Amz-Security-Token` headers that an IAM-protected endpoint expects.
//!
//! It also resolves those credentials from the conventional provider chain
//! (environment variables, the shared credentials file, the ECS container
//! metadata endpoint, and the EC2 instance metadata service), with a cached,
//! single-flight refresh path safe for concurrent callers.
//!
//! # Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use esgate_auth::credentials::Credentials;
//! use esgate_auth::sigv4::{SigningParams, sign_request};
//!
//! let credentials = Credentials::new("AKIDEXAMPLE", "secret");
//! let signed = sign_request(
//!     &SigningParams {
//!         method: "GET",
//!         path: "/_search",
//!         query: "",
//!         host: "search-mydomain.us-east-1.es.amazonaws.com",
//!         region: "us-east-1",
//!         service: "es",
//!     },
//!     b"",
//!     &credentials,
//!     Utc::now(),
//! );
//! assert!(signed.authorization.starts_with("AWS4-HMAC-SHA256"));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`cache`] - Cached, single-flight credential resolution
//! - [`credentials`] - Credential value type and the provider chain
//! - [`error`] - Credential resolution error types
//! - [`sigv4`] - Signature computation and the signed header set

pub mod cache;
pub mod canonical;
pub mod credentials;
pub mod error;
pub mod sigv4;

pub use cache::CredentialCache;
pub use credentials::{Credentials, ProvideCredentials, StaticProvider};
pub use error::CredentialError;
pub use sigv4::{SignedHeaderSet, SigningParams, hash_payload, sign_request};
