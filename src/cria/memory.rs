//! Narrow persistence contracts consumed by reduction strategies.
//!
//! `KVMemory<T>` and `VectorMemory<T>` are interfaces only — concrete
//! backends (an on-disk summary cache, a vector database) are external
//! collaborators the core never implements. The fit loop performs no
//! locking around these; the contract is "at most one writer per key at a
//! time per process," enforced by the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::error::Error;
use std::fmt;

/// A stored entry, timestamped on creation and on every subsequent write.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl<T> Entry<T> {
    #[must_use]
    pub fn new(data: T) -> Self {
        let now = Utc::now();
        Self {
            data,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }
}

/// Error surfaced by a [`KVMemory`] or [`VectorMemory`] backend.
#[derive(Debug)]
pub struct MemoryError(pub Box<dyn Error + Send + Sync>);

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory backend error: {}", self.0)
    }
}

impl Error for MemoryError {}

/// Key-value persistence for strategy-authored entries (e.g. the
/// [`crate::cria::strategy::summary::SummaryStrategy`] cache keyed by a
/// scope's `id`).
#[async_trait]
pub trait KVMemory<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Fetch the entry stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Entry<T>>, MemoryError>;

    /// Write (or overwrite) the entry at `key`. Implementations must treat
    /// repeated writes as idempotent: a strategy may retry a write
    /// after a host-initiated cancellation.
    async fn set(&self, key: &str, data: T, metadata: Option<Value>) -> Result<(), MemoryError>;

    /// Remove the entry at `key`, returning whether one was present.
    async fn delete(&self, key: &str) -> Result<bool, MemoryError>;
}

/// A single vector search hit.
#[derive(Debug, Clone)]
pub struct VectorSearchResult<T> {
    pub key: String,
    pub score: f64,
    pub entry: Entry<T>,
}

/// Options narrowing a [`VectorMemory::search`] call.
#[derive(Debug, Clone, Default)]
pub struct VectorSearchOptions {
    pub limit: Option<usize>,
    pub threshold: Option<f64>,
}

/// Similarity-search persistence consumed by
/// [`crate::cria::strategy::vector_search::VectorSearchStrategy`].
///
/// `get`/`set`/`delete` are optional (default to "not supported") since a
/// read-only retrieval index may have no write path.
#[async_trait]
pub trait VectorMemory<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Return the entries most similar to `query`, best match first.
    async fn search(
        &self,
        query: &str,
        options: VectorSearchOptions,
    ) -> Result<Vec<VectorSearchResult<T>>, MemoryError>;

    /// Fetch a single entry by key, if the backend supports direct lookup.
    async fn get(&self, _key: &str) -> Result<Option<Entry<T>>, MemoryError> {
        Ok(None)
    }

    /// Index `data` under `key`, if the backend supports writes.
    async fn set(&self, _key: &str, _data: T, _metadata: Option<Value>) -> Result<(), MemoryError> {
        Ok(())
    }

    /// Remove the entry at `key`, if the backend supports deletion.
    async fn delete(&self, _key: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! An in-memory `KVMemory`/`VectorMemory` pair used only by this
    //! crate's own tests; not part of the public API (concrete backends
    //! are out of scope, see module docs).

    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryKv<T> {
        entries: Mutex<HashMap<String, Entry<T>>>,
    }

    impl<T> InMemoryKv<T> {
        pub fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl<T> KVMemory<T> for InMemoryKv<T>
    where
        T: Clone + Send + Sync,
    {
        async fn get(&self, key: &str) -> Result<Option<Entry<T>>, MemoryError> {
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn set(
            &self,
            key: &str,
            data: T,
            metadata: Option<Value>,
        ) -> Result<(), MemoryError> {
            let mut guard = self.entries.lock().await;
            let now = Utc::now();
            let created_at = guard.get(key).map(|e| e.created_at).unwrap_or(now);
            guard.insert(
                key.to_string(),
                Entry {
                    data,
                    created_at,
                    updated_at: now,
                    metadata,
                },
            );
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<bool, MemoryError> {
            Ok(self.entries.lock().await.remove(key).is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::InMemoryKv;
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let kv: InMemoryKv<String> = InMemoryKv::new();
        kv.set("s", "hello".to_string(), None).await.unwrap();
        let entry = kv.get("s").await.unwrap().unwrap();
        assert_eq!(entry.data, "hello");
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let kv: InMemoryKv<String> = InMemoryKv::new();
        assert!(!kv.delete("missing").await.unwrap());
        kv.set("s", "v".to_string(), None).await.unwrap();
        assert!(kv.delete("s").await.unwrap());
        assert!(kv.get("s").await.unwrap().is_none());
    }
}
