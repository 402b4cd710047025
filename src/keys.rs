use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// KeyStoreError
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to fetch signing key set: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("signing key set unavailable, next fetch allowed in {0:?}")]
    CoolingDown(Duration),
}

// 1. KeyStore Contract
/// KeyStore
///
/// Source of the public keys trusted to sign bearer tokens. Looking up a key id that is
/// not published is not an error: it yields `Ok(None)`.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn find_key(&self, kid: &str) -> Result<Option<Jwk>, KeyStoreError>;
}

/// KeyStoreState
///
/// The concrete type used to share the key store across the application state.
pub type KeyStoreState = Arc<dyn KeyStore>;

/// Minimum time between two fetches of the key set, failed fetches included.
const REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

// 2. The Real Implementation (identity provider JWKS endpoint)
/// RemoteKeyStore
///
/// Fetches the provider's JWKS document on first use and caches it for the lifetime of the
/// process. When a token references a key id missing from the cache, the set is fetched
/// again (signing keys rotate). Fetches run one at a time and at most once per cooldown,
/// whether they succeed or not.
pub struct RemoteKeyStore {
    client: reqwest::Client,
    jwks_url: String,
    cooldown: Duration,
    cache: RwLock<Option<Arc<JwkSet>>>,
    // Held for the duration of a fetch; records when the last one started.
    last_attempt: Mutex<Option<Instant>>,
}

impl RemoteKeyStore {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            jwks_url: jwks_url.into(),
            cooldown: REFRESH_COOLDOWN,
            cache: RwLock::new(None),
            last_attempt: Mutex::new(None),
        }
    }

    /// Overrides the minimum time between two fetches.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    async fn cached(&self) -> Option<Arc<JwkSet>> {
        self.cache.read().await.clone()
    }

    async fn fetch(&self) -> Result<Arc<JwkSet>, KeyStoreError> {
        tracing::info!(url = %self.jwks_url, "fetching signing key set");
        let keys: JwkSet = self
            .client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let keys = Arc::new(keys);
        *self.cache.write().await = Some(keys.clone());
        Ok(keys)
    }
}

#[async_trait]
impl KeyStore for RemoteKeyStore {
    async fn find_key(&self, kid: &str) -> Result<Option<Jwk>, KeyStoreError> {
        if let Some(jwk) = self.cached().await.and_then(|keys| keys.find(kid).cloned()) {
            return Ok(Some(jwk));
        }

        let mut last_attempt = self.last_attempt.lock().await;

        // Another lookup may have refreshed the set while this one waited for the lock.
        let cached = self.cached().await;
        if let Some(jwk) = cached.as_ref().and_then(|keys| keys.find(kid).cloned()) {
            return Ok(Some(jwk));
        }

        let since_last = (*last_attempt).map(|at| at.elapsed());
        if let Some(elapsed) = since_last.filter(|elapsed| *elapsed < self.cooldown) {
            tracing::debug!(kid, "unknown signing key id, refresh on cooldown");
            return match cached {
                Some(_) => Ok(None),
                None => Err(KeyStoreError::CoolingDown(self.cooldown - elapsed)),
            };
        }

        *last_attempt = Some(Instant::now());
        let keys = self.fetch().await?;
        Ok(keys.find(kid).cloned())
    }
}

// 3. The Static Implementation (tests, pinned keys)
/// StaticKeyStore
///
/// Serves a fixed, pre-loaded key set. Never touches the network.
#[derive(Clone)]
pub struct StaticKeyStore {
    keys: Arc<JwkSet>,
}

impl StaticKeyStore {
    pub fn new(keys: JwkSet) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }

    /// Parses a JWKS document (`{"keys": [...]}`).
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document).map(Self::new)
    }
}

#[async_trait]
impl KeyStore for StaticKeyStore {
    async fn find_key(&self, kid: &str) -> Result<Option<Jwk>, KeyStoreError> {
        Ok(self.keys.find(kid).cloned())
    }
}
