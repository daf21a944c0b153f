//! Tracking sources and the authorization cache in front of them.

use std::sync::Arc;
use std::time::Duration;

use atrio_core::cache::TtlCache;
use atrio_core::id::SourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::SourceStore;

/// A registered event source, e.g. a website snippet or a mobile SDK key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Source id presented by clients.
    pub id: SourceId,
    /// Human-readable name.
    pub name: String,
    /// Disabled sources reject all traffic.
    pub enabled: bool,
    /// Consent configuration echoed back to clients.
    #[serde(default)]
    pub consent: Value,
}

impl Source {
    /// Creates an enabled source with no consent configuration.
    #[must_use]
    pub fn new(id: SourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            consent: Value::Null,
        }
    }

    /// Disables the source.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Read-through cache that authorizes tracking requests against registered
/// sources without hitting storage on every request.
///
/// Known sources are cached for the configured TTL, including disabled ones,
/// so flipping a source off takes effect within one TTL window. Unknown ids
/// are not cached and retry storage on every request.
pub struct SourceCache {
    store: Arc<dyn SourceStore>,
    cache: TtlCache<Source>,
    ttl: Duration,
}

impl SourceCache {
    /// Creates a cache over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SourceStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Authorizes a request against the source registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] when the source is unknown or
    /// disabled, and [`Error::Storage`] when the registry lookup fails.
    pub async fn validate(&self, id: &SourceId) -> Result<Source> {
        let source = match self.cache.get(id.as_str())? {
            Some(source) => source,
            None => {
                let Some(source) = self.store.load_source(id).await? else {
                    return Err(Error::unauthorized(format!(
                        "source `{id}` is not registered"
                    )));
                };
                self.cache.insert(id.as_str(), source.clone(), self.ttl)?;
                source
            }
        };
        if !source.enabled {
            return Err(Error::unauthorized(format!("source `{id}` is disabled")));
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemorySourceStore;

    fn cache_over(store: MemorySourceStore) -> SourceCache {
        SourceCache::new(Arc::new(store), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn unknown_source_is_unauthorized() {
        let cache = cache_over(MemorySourceStore::new());
        let err = cache.validate(&SourceId::generate()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn disabled_source_is_unauthorized() {
        let store = MemorySourceStore::new();
        let id = SourceId::generate();
        store
            .insert_source(Source::new(id.clone(), "old widget").disabled())
            .unwrap();
        let cache = cache_over(store);
        let err = cache.validate(&id).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn known_source_is_served_from_cache() {
        let store = MemorySourceStore::new();
        let id = SourceId::generate();
        store
            .insert_source(Source::new(id.clone(), "web widget"))
            .unwrap();
        let cache = cache_over(store);

        let first = cache.validate(&id).await.unwrap();
        assert_eq!(first.name, "web widget");
        let second = cache.validate(&id).await.unwrap();
        assert_eq!(second.name, "web widget");
    }
}
