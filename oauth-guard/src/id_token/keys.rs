//! Signing key retrieval and the process-wide key cache.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::DecodingKey;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::ProviderKind;
use crate::error::{id_token_error, Error, IdTokenErrorKind};
use crate::http::{HttpClient, HttpClientBuilder, HttpClientConfig};

/// Source of published key sets.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the key set published at `jwks_uri`.
    async fn fetch_key_set(&self, jwks_uri: &str) -> Result<JwkSet, Error>;
}

/// Fetches key sets over HTTP.
#[derive(Clone)]
pub struct HttpKeySource {
    client: HttpClient,
}

impl HttpKeySource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Build the HTTP client from `config` and wrap it.
    pub fn from_config(config: HttpClientConfig) -> Result<Self, Error> {
        let client = HttpClientBuilder::from_config(config).build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_key_set(&self, jwks_uri: &str) -> Result<JwkSet, Error> {
        debug!("Fetching key set from {}", jwks_uri);
        let key_set = self
            .client
            .get(jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(key_set)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    provider: ProviderKind,
    kid: String,
}

/// Verified public keys keyed by provider and key id.
///
/// Entries never change once inserted and are kept for the life of the cache.
/// Lookups for a key id that is not cached yet are coalesced: the first caller
/// fetches while the others wait on the same per-key lock, then read the result.
/// Failed fetches are not remembered.
#[derive(Default)]
pub struct KeyCache {
    keys: DashMap<CacheKey, DecodingKey>,
    fetch_locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every validator in the process.
    pub fn shared() -> Arc<KeyCache> {
        static SHARED: OnceLock<Arc<KeyCache>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(KeyCache::new())))
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get the key for `kid`, fetching the provider's key set on a miss.
    ///
    /// # Arguments
    ///
    /// * `provider` - Provider the token claims to come from
    /// * `kid` - Key id from the token header
    /// * `jwks_uri` - Where the provider publishes its key set
    /// * `source` - Fetcher used on a cache miss
    pub async fn get_or_fetch(
        &self,
        provider: ProviderKind,
        kid: &str,
        jwks_uri: &str,
        source: &dyn KeySource,
    ) -> Result<DecodingKey, Error> {
        let cache_key = CacheKey {
            provider,
            kid: kid.to_string(),
        };

        if let Some(key) = self.lookup(&cache_key) {
            return Ok(key);
        }

        // Get or create the fetch lock for this key id
        let lock = self
            .fetch_locks
            .entry(cache_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // Dropped after `_guard`, on every exit path including cancellation
        let _release = FetchLockRelease {
            locks: &self.fetch_locks,
            cache_key: &cache_key,
            lock: &lock,
        };
        let _guard = lock.lock().await;

        // Another caller may have fetched it while we waited
        if let Some(key) = self.lookup(&cache_key) {
            debug!("[{}] Signing key {} fetched by a concurrent request", provider, kid);
            return Ok(key);
        }

        debug!("[{}] Signing key {} not cached, fetching", provider, kid);
        let key = Self::fetch(provider, kid, jwks_uri, source).await?;

        self.keys.insert(cache_key.clone(), key.clone());

        Ok(key)
    }

    fn lookup(&self, cache_key: &CacheKey) -> Option<DecodingKey> {
        self.keys.get(cache_key).map(|entry| entry.value().clone())
    }

    async fn fetch(
        provider: ProviderKind,
        kid: &str,
        jwks_uri: &str,
        source: &dyn KeySource,
    ) -> Result<DecodingKey, Error> {
        let retrieval_error = |reason: &str| {
            warn!("[{}] Signing key {} unavailable: {}", provider, kid, reason);
            id_token_error(
                provider,
                IdTokenErrorKind::KeyRetrieval,
                &format!("Failed to retrieve signing key for kid {}: {}", kid, reason),
            )
        };

        let key_set = source
            .fetch_key_set(jwks_uri)
            .await
            .map_err(|e| retrieval_error(&e.to_string()))?;

        let jwk = key_set
            .find(kid)
            .ok_or_else(|| retrieval_error("key id not present in the published key set"))?;

        if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
            return Err(retrieval_error("published key is not an RSA key"));
        }

        DecodingKey::from_jwk(jwk).map_err(|e| retrieval_error(&e.to_string()))
    }
}

/// Removes a fetch lock from the map once its holder is done, unless the
/// entry has since been replaced by a newer lock.
struct FetchLockRelease<'a> {
    locks: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    cache_key: &'a CacheKey,
    lock: &'a Arc<Mutex<()>>,
}

impl Drop for FetchLockRelease<'_> {
    fn drop(&mut self) {
        self.locks
            .remove_if(self.cache_key, |_, current| Arc::ptr_eq(current, self.lock));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::ErrorKind;

    pub(crate) const FIXTURE_JWKS_JSON: &str = include_str!("../../tests/fixtures/jwks.json");

    pub(crate) fn fixture_key_set() -> JwkSet {
        serde_json::from_str(FIXTURE_JWKS_JSON).unwrap()
    }

    /// Serves the fixture key set, counting fetches.
    pub(crate) struct StaticKeySource {
        key_set: JwkSet,
        delay: Duration,
        pub(crate) fetches: AtomicUsize,
    }

    impl StaticKeySource {
        pub(crate) fn new() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        pub(crate) fn with_delay(delay: Duration) -> Self {
            Self {
                key_set: fixture_key_set(),
                delay,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KeySource for StaticKeySource {
        async fn fetch_key_set(&self, _jwks_uri: &str) -> Result<JwkSet, Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.key_set.clone())
        }
    }

    /// Fails the first `failures` fetches, then serves the fixture key set.
    pub(crate) struct FlakyKeySource {
        failures: usize,
        pub(crate) fetches: AtomicUsize,
    }

    impl FlakyKeySource {
        pub(crate) fn new(failures: usize) -> Self {
            Self {
                failures,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KeySource for FlakyKeySource {
        async fn fetch_key_set(&self, _jwks_uri: &str) -> Result<JwkSet, Error> {
            let attempt = self.fetches.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(Error {
                    source: Some("JWKS error".into()),
                    error_kind: ErrorKind::Http(crate::error::HttpErrorKind::Network),
                    provider: None,
                });
            }
            Ok(fixture_key_set())
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let cache = KeyCache::new();
        let source = StaticKeySource::new();

        cache
            .get_or_fetch(ProviderKind::Google, "test-kid", "unused", &source)
            .await
            .unwrap();
        cache
            .get_or_fetch(ProviderKind::Google, "test-kid", "unused", &source)
            .await
            .unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_provider() {
        let cache = KeyCache::new();
        let source = StaticKeySource::new();

        cache
            .get_or_fetch(ProviderKind::Google, "test-kid", "unused", &source)
            .await
            .unwrap();
        cache
            .get_or_fetch(ProviderKind::Apple, "test-kid", "unused", &source)
            .await
            .unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let cache = Arc::new(KeyCache::new());
        let source = Arc::new(StaticKeySource::with_delay(Duration::from_millis(50)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let source = Arc::clone(&source);
                tokio::spawn(async move {
                    cache
                        .get_or_fetch(ProviderKind::Microsoft, "test-kid", "unused", source.as_ref())
                        .await
                        .map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(cache.fetch_locks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = KeyCache::new();
        let source = FlakyKeySource::new(1);

        let err = cache
            .get_or_fetch(ProviderKind::Apple, "test-kid", "unused", &source)
            .await
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::KeyRetrieval)
        );
        assert!(err.to_string().contains("Failed to retrieve signing key for kid test-kid"));
        assert!(err.to_string().starts_with("[apple]"));
        assert!(cache.is_empty());
        assert!(cache.fetch_locks.is_empty());

        cache
            .get_or_fetch(ProviderKind::Apple, "test-kid", "unused", &source)
            .await
            .unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert!(cache.fetch_locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kids_leave_no_fetch_locks() {
        let cache = KeyCache::new();
        let source = StaticKeySource::new();

        for i in 0..200 {
            let kid = format!("unknown-{}", i);
            assert!(cache
                .get_or_fetch(ProviderKind::Google, &kid, "unused", &source)
                .await
                .is_err());
        }

        assert!(cache.is_empty());
        assert!(cache.fetch_locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_its_lock() {
        let cache = KeyCache::new();
        let source = StaticKeySource::with_delay(Duration::from_secs(60));

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_fetch(ProviderKind::Microsoft, "test-kid", "unused", &source),
        )
        .await;

        assert!(result.is_err());
        assert!(cache.fetch_locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kid_fails_retrieval() {
        let cache = KeyCache::new();
        let source = StaticKeySource::new();

        let err = cache
            .get_or_fetch(ProviderKind::Google, "rotated-away", "unused", &source)
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::KeyRetrieval)
        );
        assert!(err.to_string().contains("rotated-away"));
    }

    #[tokio::test]
    async fn test_non_rsa_key_fails_retrieval() {
        let cache = KeyCache::new();
        let source = StaticKeySource::new();

        let err = cache
            .get_or_fetch(ProviderKind::Google, "ec-kid", "unused", &source)
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::KeyRetrieval)
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_http_key_source_fetches_key_set() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/keys")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(FIXTURE_JWKS_JSON)
            .create_async()
            .await;

        let source = HttpKeySource::from_config(HttpClientConfig::default()).unwrap();
        let key_set = source
            .fetch_key_set(&format!("{}/keys", server.url()))
            .await
            .unwrap();

        assert!(key_set.find("test-kid").is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_key_source_reports_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/keys")
            .with_status(503)
            .create_async()
            .await;

        let source = HttpKeySource::from_config(HttpClientConfig::default()).unwrap();
        let err = source
            .fetch_key_set(&format!("{}/keys", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err.error_kind, ErrorKind::Http(_)));
    }

    #[tokio::test]
    async fn test_http_key_source_rejects_non_jwks_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/keys")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let source = HttpKeySource::from_config(HttpClientConfig::default()).unwrap();
        let result = source
            .fetch_key_set(&format!("{}/keys", server.url()))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_fetch_failure_surfaces_as_key_retrieval() {
        let cache = KeyCache::new();
        let config = HttpClientConfig {
            timeout: Duration::from_secs(2),
            ..HttpClientConfig::default()
        };
        let source = HttpKeySource::from_config(config).unwrap();

        let err = cache
            .get_or_fetch(
                ProviderKind::Google,
                "test-kid",
                "http://127.0.0.1:9/keys",
                &source,
            )
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(err.to_string().contains("test-kid"));
    }
}
