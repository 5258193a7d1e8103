//! Credential value type and the ambient provider chain.
//!
//! Providers are tried in a fixed order until one yields a value, matching
//! the conventional AWS default chain:
//!
//! 1. environment variables (`AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`),
//! 2. the shared credentials file (`~/.aws/credentials`),
//! 3. the ECS container metadata endpoint,
//! 4. the EC2 instance metadata service (IMDSv2).
//!
//! A provider answers `Ok(None)` when it is simply not configured in the
//! current environment, which moves the chain along; `Err` marks a provider
//! that should have worked but failed, which is logged and also moves the
//! chain along. The chain itself lives in [`crate::cache::CredentialCache`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::CredentialError;

/// An immutable resolved credential four-tuple.
///
/// Replaced wholesale on refresh; never persisted. A value without
/// `expires_at` (environment or profile credentials) stays valid for the
/// process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// AWS access key ID.
    pub access_key_id: String,
    /// AWS secret access key.
    pub secret_access_key: String,
    /// STS session token for temporary credentials.
    pub session_token: Option<String>,
    /// Expiry of temporary credentials.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Create long-lived credentials without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    /// Whether the value is still usable at `now`, with a safety margin so a
    /// signature computed from it does not expire mid-flight.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + chrono::Duration::seconds(60) < expires_at,
            None => true,
        }
    }
}

// Manual Debug so the secret key cannot end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_deref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One strategy for locating ambient credentials.
#[async_trait]
pub trait ProvideCredentials: Send + Sync + fmt::Debug {
    /// Short provider name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Attempt to produce credentials. `Ok(None)` means this provider is not
    /// configured in the current environment and the chain should continue.
    async fn provide(&self) -> Result<Option<Credentials>, CredentialError>;
}

/// A provider that always returns one fixed value. Useful for tests and for
/// embedding esgate with externally managed credentials.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    credentials: Credentials,
}

impl StaticProvider {
    /// Wrap a fixed credential value.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl ProvideCredentials for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
        Ok(Some(self.credentials.clone()))
    }
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and
/// `AWS_SESSION_TOKEN` from the process environment.
#[derive(Debug, Default)]
pub struct EnvProvider;

#[async_trait]
impl ProvideCredentials for EnvProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
        let (Ok(access_key_id), Ok(secret_access_key)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) else {
            return Ok(None);
        };

        Ok(Some(Credentials {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            expires_at: None,
        }))
    }
}

/// Reads the shared credentials file (`AWS_SHARED_CREDENTIALS_FILE` or
/// `~/.aws/credentials`), using the profile named by `AWS_PROFILE` or
/// `default`.
#[derive(Debug, Default)]
pub struct ProfileProvider {
    /// Override of the credentials file path, for tests.
    path: Option<PathBuf>,
}

impl ProfileProvider {
    /// A provider reading a specific file instead of the ambient location.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
            return Some(PathBuf::from(path));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".aws").join("credentials"))
    }
}

#[async_trait]
impl ProvideCredentials for ProfileProvider {
    fn name(&self) -> &'static str {
        "shared-profile"
    }

    async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
        let Some(path) = self.resolve_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let profile = std::env::var("AWS_PROFILE").unwrap_or_else(|_| "default".to_owned());
        let contents = tokio::fs::read_to_string(&path).await?;
        Ok(parse_profile(&contents, &profile))
    }
}

/// Parse one profile section of an AWS shared credentials file.
fn parse_profile(contents: &str, profile: &str) -> Option<Credentials> {
    let mut in_profile = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().to_owned();
            match key.trim().to_ascii_lowercase().as_str() {
                "aws_access_key_id" => access_key_id = Some(value),
                "aws_secret_access_key" => secret_access_key = Some(value),
                "aws_session_token" => session_token = Some(value),
                _ => {}
            }
        }
    }

    Some(Credentials {
        access_key_id: access_key_id?,
        secret_access_key: secret_access_key?,
        session_token,
        expires_at: None,
    })
}

/// The credential document served by both metadata endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<String>,
}

impl MetadataCredentials {
    fn into_credentials(self, provider: &'static str) -> Result<Credentials, CredentialError> {
        let expires_at = match self.expiration {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| CredentialError::Malformed {
                        provider,
                        reason: format!("bad Expiration {raw:?}: {e}"),
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(Credentials {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.token,
            expires_at,
        })
    }
}

/// Fetches temporary credentials from the ECS container metadata endpoint
/// when `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` (or `..._FULL_URI`) is set.
#[derive(Debug)]
pub struct ContainerProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ContainerProvider {
    /// Default ECS credential endpoint.
    const DEFAULT_BASE: &'static str = "http://169.254.170.2";

    /// New provider against the standard endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, Self::DEFAULT_BASE)
    }

    /// New provider against a custom endpoint, for tests.
    #[must_use]
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProvideCredentials for ContainerProvider {
    fn name(&self) -> &'static str {
        "container-metadata"
    }

    async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
        let url = if let Ok(full) = std::env::var("AWS_CONTAINER_CREDENTIALS_FULL_URI") {
            full
        } else if let Ok(relative) = std::env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
            format!("{}{relative}", self.base_url)
        } else {
            return Ok(None);
        };

        debug!(%url, "fetching container credentials");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let doc: MetadataCredentials = response.json().await?;
        doc.into_credentials(self.name()).map(Some)
    }
}

/// Fetches temporary credentials from the EC2 instance metadata service
/// using IMDSv2 (session-token handshake).
#[derive(Debug)]
pub struct InstanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl InstanceProvider {
    /// Default IMDS endpoint.
    const DEFAULT_BASE: &'static str = "http://169.254.169.254";

    /// New provider against the standard endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, Self::DEFAULT_BASE)
    }

    /// New provider against a custom endpoint, for tests.
    #[must_use]
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProvideCredentials for InstanceProvider {
    fn name(&self) -> &'static str {
        "instance-metadata"
    }

    async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
        if std::env::var("AWS_EC2_METADATA_DISABLED")
            .is_ok_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(None);
        }

        // IMDSv2 handshake. An unreachable endpoint just means we are not on
        // EC2, so the chain moves on.
        let token = match self
            .client
            .put(format!("{}/latest/api/token", self.base_url))
            .header("x-aws-ec2-metadata-token-ttl-seconds", "21600")
            .send()
            .await
        {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.text().await?,
                Err(_) => return Ok(None),
            },
            Err(e) => {
                debug!(error = %e, "instance metadata endpoint not reachable");
                return Ok(None);
            }
        };

        let roles_url = format!(
            "{}/latest/meta-data/iam/security-credentials/",
            self.base_url
        );
        let roles = self
            .client
            .get(&roles_url)
            .header("x-aws-ec2-metadata-token", &token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let Some(role) = roles.lines().next().map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };

        debug!(role, "fetching instance credentials");
        let doc: MetadataCredentials = self
            .client
            .get(format!("{roles_url}{role}"))
            .header("x-aws-ec2-metadata-token", &token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        doc.into_credentials(self.name()).map(Some)
    }
}

/// Build the HTTP client shared by the metadata providers. Link-local
/// endpoints answer fast or not at all, so timeouts are short.
pub(crate) fn metadata_client() -> Result<reqwest::Client, CredentialError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(1))
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(CredentialError::Http)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_should_treat_credentials_without_expiry_as_fresh() {
        let credentials = Credentials::new("AKID", "secret");
        assert!(credentials.is_fresh(Utc::now()));
    }

    #[test]
    fn test_should_treat_expired_credentials_as_stale() {
        let mut credentials = Credentials::new("AKID", "secret");
        credentials.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        assert!(!credentials.is_fresh(Utc::now()));
    }

    #[test]
    fn test_should_apply_expiry_safety_margin() {
        let now = Utc::now();
        let mut credentials = Credentials::new("AKID", "secret");
        // Expires in 30s: inside the 60s margin, so already stale.
        credentials.expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(!credentials.is_fresh(now));
        credentials.expires_at = Some(now + chrono::Duration::seconds(120));
        assert!(credentials.is_fresh(now));
    }

    #[test]
    fn test_should_redact_secrets_in_debug_output() {
        let mut credentials = Credentials::new("AKID", "super-secret");
        credentials.session_token = Some("token".to_owned());
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("token\""));
    }

    #[test]
    fn test_should_parse_default_profile() {
        let contents = "\
            [default]\n\
            aws_access_key_id = AKIDPROFILE\n\
            aws_secret_access_key = profilesecret\n";
        let credentials = parse_profile(contents, "default").unwrap();
        assert_eq!(credentials.access_key_id, "AKIDPROFILE");
        assert_eq!(credentials.secret_access_key, "profilesecret");
        assert!(credentials.session_token.is_none());
    }

    #[test]
    fn test_should_parse_named_profile_with_token() {
        let contents = "\
            [default]\n\
            aws_access_key_id = AKIDDEFAULT\n\
            aws_secret_access_key = defaultsecret\n\
            \n\
            [staging]\n\
            aws_access_key_id = AKIDSTAGING\n\
            aws_secret_access_key = stagingsecret\n\
            aws_session_token = stagingtoken\n";
        let credentials = parse_profile(contents, "staging").unwrap();
        assert_eq!(credentials.access_key_id, "AKIDSTAGING");
        assert_eq!(credentials.session_token.as_deref(), Some("stagingtoken"));
    }

    #[test]
    fn test_should_skip_comments_and_unknown_keys() {
        let contents = "\
            # shared credentials\n\
            [default]\n\
            ; a comment\n\
            region = us-east-1\n\
            aws_access_key_id = AKID\n\
            aws_secret_access_key = secret\n";
        let credentials = parse_profile(contents, "default").unwrap();
        assert_eq!(credentials.access_key_id, "AKID");
    }

    #[test]
    fn test_should_return_none_for_incomplete_profile() {
        let contents = "[default]\naws_access_key_id = AKID\n";
        assert!(parse_profile(contents, "default").is_none());
        assert!(parse_profile("", "default").is_none());
    }

    #[tokio::test]
    async fn test_should_read_profile_file_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[default]").unwrap();
        writeln!(file, "aws_access_key_id = AKIDFILE").unwrap();
        writeln!(file, "aws_secret_access_key = filesecret").unwrap();
        file.flush().unwrap();

        let provider = ProfileProvider::with_path(file.path().to_path_buf());
        let credentials = provider.provide().await.unwrap().unwrap();
        assert_eq!(credentials.access_key_id, "AKIDFILE");
    }

    #[tokio::test]
    async fn test_should_skip_missing_profile_file() {
        let provider = ProfileProvider::with_path(PathBuf::from("/nonexistent/credentials"));
        assert!(provider.provide().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_provide_static_credentials() {
        let provider = StaticProvider::new(Credentials::new("AKID", "secret"));
        let credentials = provider.provide().await.unwrap().unwrap();
        assert_eq!(credentials.access_key_id, "AKID");
    }

    #[test]
    fn test_should_convert_metadata_document() {
        let doc: MetadataCredentials = serde_json::from_str(
            r#"{
                "AccessKeyId": "AKIDMETA",
                "SecretAccessKey": "metasecret",
                "Token": "metatoken",
                "Expiration": "2030-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let credentials = doc.into_credentials("test").unwrap();
        assert_eq!(credentials.access_key_id, "AKIDMETA");
        assert_eq!(credentials.session_token.as_deref(), Some("metatoken"));
        assert!(credentials.expires_at.is_some());
    }

    #[test]
    fn test_should_reject_malformed_expiration() {
        let doc: MetadataCredentials = serde_json::from_str(
            r#"{
                "AccessKeyId": "AKIDMETA",
                "SecretAccessKey": "metasecret",
                "Expiration": "not-a-timestamp"
            }"#,
        )
        .unwrap();
        assert!(matches!(
            doc.into_credentials("test"),
            Err(CredentialError::Malformed { .. })
        ));
    }
}
