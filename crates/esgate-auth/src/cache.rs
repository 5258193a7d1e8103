//! Cached, single-flight credential resolution.
//!
//! The cache is the only shared mutable state in the proxy. All readers go
//! through [`CredentialCache::resolve`]: a fresh cached value is returned
//! immediately, and a stale or missing value triggers at most one provider
//! chain run at a time, with every concurrent caller observing the same
//! refreshed value. There is no way to read a partially updated credential
//! tuple because the cached value is replaced wholesale.

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::credentials::{
    ContainerProvider, Credentials, EnvProvider, InstanceProvider, ProfileProvider,
    ProvideCredentials, metadata_client,
};
use crate::error::CredentialError;

/// A synchronized single-value credential cache in front of a provider chain.
#[derive(Debug)]
pub struct CredentialCache {
    providers: Vec<Box<dyn ProvideCredentials>>,
    cached: RwLock<Option<Credentials>>,
    // Held for the duration of one chain run; guarantees at most one
    // in-flight refresh while late arrivals wait and then re-check.
    refresh: Mutex<()>,
}

impl CredentialCache {
    /// Cache in front of an explicit provider list, tried in order.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn ProvideCredentials>>) -> Self {
        Self {
            providers,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Cache in front of the conventional default chain: environment,
    /// shared profile file, container metadata, instance metadata.
    pub fn default_chain() -> Result<Self, CredentialError> {
        let client = metadata_client()?;
        Ok(Self::new(vec![
            Box::new(EnvProvider),
            Box::new(ProfileProvider::default()),
            Box::new(ContainerProvider::new(client.clone())),
            Box::new(InstanceProvider::new(client)),
        ]))
    }

    /// Resolve credentials, refreshing through the provider chain when the
    /// cached value is missing or close to expiry.
    ///
    /// # Errors
    ///
    /// [`CredentialError::Unavailable`] when no provider yields a value. The
    /// failure is scoped to this call; the next call retries the chain.
    pub async fn resolve(&self) -> Result<Credentials, CredentialError> {
        let now = Utc::now();

        if let Some(credentials) = self.cached_if_fresh(now).await {
            return Ok(credentials);
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have finished the refresh while we waited.
        if let Some(credentials) = self.cached_if_fresh(now).await {
            return Ok(credentials);
        }

        let fresh = self.run_chain().await?;
        *self.cached.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    async fn cached_if_fresh(&self, now: chrono::DateTime<Utc>) -> Option<Credentials> {
        let cached = self.cached.read().await;
        cached.as_ref().filter(|c| c.is_fresh(now)).cloned()
    }

    async fn run_chain(&self) -> Result<Credentials, CredentialError> {
        for provider in &self.providers {
            match provider.provide().await {
                Ok(Some(credentials)) => {
                    info!(
                        provider = provider.name(),
                        access_key_id = %credentials.access_key_id,
                        "resolved AWS credentials"
                    );
                    return Ok(credentials);
                }
                Ok(None) => {
                    debug!(provider = provider.name(), "provider not configured");
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "provider failed");
                }
            }
        }
        Err(CredentialError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Counts chain hits and hands out credentials with a configurable expiry.
    #[derive(Debug)]
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        expires_in: Option<chrono::Duration>,
        delay: Duration,
    }

    #[async_trait]
    impl ProvideCredentials for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut credentials = Credentials::new("AKIDCOUNT", "secret");
            credentials.expires_at = self.expires_in.map(|d| Utc::now() + d);
            Ok(Some(credentials))
        }
    }

    /// A provider that is never configured.
    #[derive(Debug)]
    struct AbsentProvider;

    #[async_trait]
    impl ProvideCredentials for AbsentProvider {
        fn name(&self) -> &'static str {
            "absent"
        }

        async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
            Ok(None)
        }
    }

    /// A provider that fails outright.
    #[derive(Debug)]
    struct BrokenProvider;

    #[async_trait]
    impl ProvideCredentials for BrokenProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn provide(&self) -> Result<Option<Credentials>, CredentialError> {
            Err(CredentialError::Malformed {
                provider: "broken",
                reason: "boom".to_owned(),
            })
        }
    }

    fn counting_cache(
        expires_in: Option<chrono::Duration>,
        delay: Duration,
    ) -> (CredentialCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CredentialCache::new(vec![Box::new(CountingProvider {
            calls: calls.clone(),
            expires_in,
            delay,
        })]);
        (cache, calls)
    }

    #[tokio::test]
    async fn test_should_serve_cached_value_without_rerunning_chain() {
        let (cache, calls) = counting_cache(None, Duration::ZERO);

        cache.resolve().await.unwrap();
        cache.resolve().await.unwrap();
        cache.resolve().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_refresh_exactly_once_for_concurrent_callers() {
        // A slow provider widens the race window; both callers start while
        // the cache is cold.
        let (cache, calls) = counting_cache(
            Some(chrono::Duration::minutes(30)),
            Duration::from_millis(50),
        );
        let cache = Arc::new(cache);

        let (a, b) = tokio::join!(cache.resolve(), cache.resolve());
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_should_refresh_when_cached_value_expires() {
        // First value expires immediately, the next resolve must hit the
        // provider again.
        let (cache, calls) = counting_cache(Some(chrono::Duration::seconds(-1)), Duration::ZERO);

        cache.resolve().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.resolve().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_should_fall_through_absent_and_broken_providers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CredentialCache::new(vec![
            Box::new(AbsentProvider),
            Box::new(BrokenProvider),
            Box::new(CountingProvider {
                calls: calls.clone(),
                expires_in: None,
                delay: Duration::ZERO,
            }),
        ]);

        let credentials = cache.resolve().await.unwrap();
        assert_eq!(credentials.access_key_id, "AKIDCOUNT");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_report_unavailable_when_chain_exhausted() {
        let cache = CredentialCache::new(vec![Box::new(AbsentProvider), Box::new(BrokenProvider)]);
        assert!(matches!(
            cache.resolve().await,
            Err(CredentialError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_should_retry_chain_after_failure() {
        // Unavailable is per-call: a later resolve runs the chain again.
        let cache = CredentialCache::new(vec![Box::new(AbsentProvider)]);
        assert!(cache.resolve().await.is_err());
        assert!(cache.resolve().await.is_err());
    }
}
