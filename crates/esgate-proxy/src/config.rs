//! Upstream target, region inference, and proxy configuration.

use std::time::Duration;

use http::Uri;

/// Signing service name for OpenSearch/Elasticsearch domains.
pub const SERVICE_NAME: &str = "es";

/// Hostname suffix of managed Elasticsearch domains, used for region
/// inference.
const MANAGED_DOMAIN_SUFFIX: &str = ".es.amazonaws.com";

/// Errors that make the process unable to start. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No upstream endpoint was given on the command line or environment.
    #[error("upstream endpoint is required (argument or ENDPOINT environment variable)")]
    MissingEndpoint,

    /// The endpoint could not be parsed into scheme/host.
    #[error("invalid upstream endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as given.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No explicit region and the hostname does not carry one.
    #[error(
        "region cannot be parsed from endpoint {endpoint:?}; \
         the hostname must end in .<region>.es.amazonaws.com or --region must be given"
    )]
    RegionNotInferred {
        /// The endpoint hostname that was inspected.
        endpoint: String,
    },

    /// The request body size limit could not be parsed.
    #[error("invalid request body limit {0:?} (expected e.g. \"10mb\", \"512kb\", \"1048576\")")]
    InvalidLimit(String),
}

/// The single fixed upstream origin all requests are forwarded to.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    /// `http` or `https`.
    pub scheme: String,
    /// Upstream hostname.
    pub host: String,
    /// Explicit port, when not the scheme default.
    pub port: Option<u16>,
    /// AWS region used in the credential scope.
    pub region: String,
    /// Signing service name.
    pub service: String,
}

impl UpstreamTarget {
    /// Parse an endpoint argument into a target, inferring the region from
    /// the hostname when none is given explicitly.
    ///
    /// A bare hostname defaults to `https`, matching how managed domains are
    /// exposed.
    pub fn parse(endpoint: &str, region: Option<&str>) -> Result<Self, ConfigError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let with_scheme = if endpoint.contains("://") {
            endpoint.to_owned()
        } else {
            format!("https://{endpoint}")
        };

        let uri: Uri = with_scheme
            .parse()
            .map_err(|e: http::uri::InvalidUri| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: e.to_string(),
            })?;

        let scheme = uri.scheme_str().unwrap_or("https").to_owned();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: format!("unsupported scheme {scheme:?}"),
            });
        }
        let host = uri
            .host()
            .ok_or_else(|| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: "no hostname".to_owned(),
            })?
            .to_owned();

        let region = match region {
            Some(region) if !region.is_empty() => region.to_owned(),
            _ => infer_region(&host).ok_or_else(|| ConfigError::RegionNotInferred {
                endpoint: host.clone(),
            })?,
        };

        Ok(Self {
            scheme,
            host,
            port: uri.port_u16(),
            region,
            service: SERVICE_NAME.to_owned(),
        })
    }

    /// Origin URL without a trailing slash, e.g. `https://example.com:9200`.
    #[must_use]
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.scheme, self.host),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// The `Host` header value the upstream sees, which is also the value
    /// that must be signed. Includes the port only when non-default.
    #[must_use]
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) if !self.is_default_port(port) => format!("{}:{port}", self.host),
            _ => self.host.clone(),
        }
    }

    fn is_default_port(&self, port: u16) -> bool {
        (self.scheme == "https" && port == 443) || (self.scheme == "http" && port == 80)
    }
}

/// Extract the region from a hostname of the form
/// `*.<region>.es.amazonaws.com` (optional trailing dot). Returns `None`
/// when the hostname does not match, in which case startup must fail unless
/// a region was given explicitly.
#[must_use]
pub fn infer_region(host: &str) -> Option<String> {
    let host = host.strip_suffix('.').unwrap_or(host);
    let prefix = host.strip_suffix(MANAGED_DOMAIN_SUFFIX)?;
    // The pattern requires a domain label before the region.
    let (rest, region) = prefix.rsplit_once('.')?;
    if rest.is_empty() || region.is_empty() {
        return None;
    }
    Some(region.to_owned())
}

/// Parse a human-readable body size limit: a bare byte count or a number
/// with a `b`, `kb`, `mb`, or `gb` suffix (case-insensitive).
pub fn parse_size_limit(raw: &str) -> Result<usize, ConfigError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(n) = trimmed.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = trimmed.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = trimmed.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = trimmed.strip_suffix('b') {
        (n, 1)
    } else {
        (trimmed.as_str(), 1)
    };

    digits
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidLimit(raw.to_owned()))
}

/// Username/password pair for the plaintext gate in front of the proxy.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    /// Expected username.
    pub user: String,
    /// Expected password.
    pub password: String,
}

/// Resolved runtime configuration consumed by the gateway service.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Maximum request body size in bytes.
    pub body_limit: usize,
    /// Path answering health checks without touching the upstream.
    pub health_path: Option<String>,
    /// Basic-auth gate, enabled only when both user and password are set.
    pub basic_auth: Option<BasicAuth>,
    /// Total timeout for one upstream exchange.
    pub upstream_timeout: Duration,
    /// TCP/TLS connect timeout to the upstream.
    pub connect_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            body_limit: 10 * 1024 * 1024,
            health_path: None,
            basic_auth: None,
            upstream_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
