//! Bounded LRU of loaded voices

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use super::{LoadedVoice, VoiceProvider};
use crate::{Error, Result};

/// Keeps at most `capacity` voices resident, evicting the least recently used
///
/// Concurrent misses for the same voice share one load; hits never wait on a
/// load in progress. A load that has started always lands in the cache.
pub struct VoiceCache {
    provider: Arc<dyn VoiceProvider>,
    entries: Arc<Mutex<LruCache<String, LoadedVoice>>>,
    loading: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl VoiceCache {
    /// Create a cache; a capacity of zero is treated as one
    #[must_use]
    pub fn new(provider: Arc<dyn VoiceProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            loading: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn VoiceProvider> {
        &self.provider
    }

    /// Get a voice, loading it on a miss
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the voice cannot be loaded
    pub async fn acquire(&self, id: &str) -> Result<LoadedVoice> {
        let key = self.provider.cache_key(id);

        if let Some(voice) = self.entries.lock().await.get(&key) {
            tracing::debug!(voice = %key, "voice cache hit");
            return Ok(voice.clone());
        }

        let gate = {
            let mut loading = self.loading.lock().await;
            Arc::clone(loading.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&gate).lock_owned().await;

        // Another request may have finished the load while we waited
        if let Some(voice) = self.entries.lock().await.get(&key) {
            tracing::debug!(voice = %key, "voice loaded by concurrent request");
            return Ok(voice.clone());
        }

        tracing::info!(voice = %key, "voice cache miss, loading");
        let provider = Arc::clone(&self.provider);
        let entries = Arc::clone(&self.entries);
        let loading = Arc::clone(&self.loading);
        let owned_id = id.to_string();

        // The load owns the gate and inserts on its own, so it completes even
        // if this caller goes away
        let load = tokio::spawn(async move {
            let _guard = guard;
            let loaded = match tokio::task::spawn_blocking(move || provider.load(&owned_id)).await {
                Ok(loaded) => loaded,
                Err(e) => Err(Error::ConfigurationMissing(format!("voice load task failed: {e}"))),
            };

            let result = match loaded {
                Ok(voice) => {
                    let evicted = entries.lock().await.push(key.clone(), voice.clone());
                    if let Some((evicted_key, _)) = evicted.filter(|(k, _)| *k != key) {
                        tracing::info!(voice = %evicted_key, "evicted voice from cache");
                    }
                    Ok(voice)
                }
                Err(e) => {
                    tracing::warn!(voice = %key, error = %e, "voice load failed");
                    Err(e)
                }
            };

            let mut loading = loading.lock().await;
            if loading.get(&key).is_some_and(|g| Arc::ptr_eq(g, &gate)) {
                loading.remove(&key);
            }
            result
        });

        load.await
            .map_err(|e| Error::ConfigurationMissing(format!("voice load task failed: {e}")))?
    }

    /// Keys currently resident, most recently used first
    pub async fn resident_ids(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }
}
