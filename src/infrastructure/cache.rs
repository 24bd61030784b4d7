//! Injected cache capability and the quote cache built on it

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::quote::{Quote, QuoteProvider, QuoteRequest};
use crate::shared::errors::QuoteError;

/// Key-value cache with implementation-defined expiry
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: V);
    async fn clear(&self);
}

/// Process-local cache; entries expire `ttl` after insertion
pub struct InMemoryCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (V, Instant)>>,
}

impl<V> InMemoryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl<V> Cache<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, inserted)) if inserted.elapsed() <= self.ttl => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // expired
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: V) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now()));
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Quote provider that answers repeated identical requests from a cache.
///
/// Cached quotes keep their original `fetched_at`, so staleness checks
/// downstream still see the true age. `requote` always goes upstream and
/// replaces the cached entry.
pub struct CachedQuoteProvider {
    inner: Arc<dyn QuoteProvider>,
    cache: Arc<dyn Cache<Quote>>,
}

impl CachedQuoteProvider {
    pub fn new(inner: Arc<dyn QuoteProvider>, cache: Arc<dyn Cache<Quote>>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl QuoteProvider for CachedQuoteProvider {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let key = request.cache_key();
        if let Some(quote) = self.cache.get(&key).await {
            debug!("Quote cache hit for {}", key);
            return Ok(quote);
        }

        let quote = self.inner.quote(request).await?;
        self.cache.set(&key, quote.clone()).await;
        Ok(quote)
    }

    async fn requote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let quote = self.inner.requote(request).await?;
        self.cache.set(&request.cache_key(), quote.clone()).await;
        Ok(quote)
    }
}
