//! Credential resolution error types.

/// Errors surfaced while resolving AWS credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Every provider in the chain was tried and none yielded a usable value.
    #[error(
        "no credential provider yielded a usable value \
         (tried environment, shared profile, container metadata, instance metadata)"
    )]
    Unavailable,

    /// Reading the shared credentials file failed.
    #[error("cannot read shared credentials file: {0}")]
    Io(#[from] std::io::Error),

    /// A metadata endpoint request failed.
    #[error("metadata endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A provider returned a response that could not be interpreted.
    #[error("malformed credential response from {provider}: {reason}")]
    Malformed {
        /// Name of the provider that produced the response.
        provider: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}
