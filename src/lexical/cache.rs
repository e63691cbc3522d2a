/// Process-wide, collection-keyed cache of lexical indexes.
///
/// Bounded by entry count and a time-to-live, so memory stays flat when many
/// collections are queried. Writers to a collection must call `invalidate`;
/// the next query rebuilds the index from storage.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::{Bm25Params, LexicalHit, LexicalIndex};
use crate::config::LexicalConfig;
use crate::errors::RagError;
use crate::store::ChunkStore;

pub struct LexicalIndexCache {
    store: Arc<dyn ChunkStore>,
    params: Bm25Params,
    cache: Cache<String, Arc<LexicalIndex>>,
}

impl LexicalIndexCache {
    pub fn new(store: Arc<dyn ChunkStore>, config: &LexicalConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_cached_collections)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Self {
            store,
            params: Bm25Params::from(config),
            cache,
        }
    }

    /// Return the cached index for a collection, building it on first use.
    ///
    /// Concurrent callers for the same collection share one build. Storage failures
    /// are reported as `IndexBuild` and nothing is cached.
    pub async fn build_index(&self, collection_id: &str) -> Result<Arc<LexicalIndex>, RagError> {
        let store = Arc::clone(&self.store);
        let params = self.params;
        let id = collection_id.to_string();

        self.cache
            .try_get_with(collection_id.to_string(), async move {
                let chunks = store
                    .list_chunks(&id)
                    .await
                    .map_err(|e| RagError::index_build(&id, e.to_string()))?;

                let index = LexicalIndex::build(&id, &chunks, params)?;
                tracing::info!(
                    collection_id = %id,
                    documents = index.len(),
                    avgdl = index.avgdl(),
                    "Lexical index built"
                );
                Ok::<_, RagError>(Arc::new(index))
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Top `k` lexically relevant chunks for a query in the given collection.
    pub async fn search(
        &self,
        collection_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<LexicalHit>, RagError> {
        let index = self.build_index(collection_id).await?;
        let hits = index.search(query, k);
        tracing::debug!(
            collection_id = %collection_id,
            hits = hits.len(),
            "Lexical search complete"
        );
        Ok(hits)
    }

    /// Drop the cached index so the next query rebuilds it.
    pub async fn invalidate(&self, collection_id: &str) {
        self.cache.invalidate(collection_id).await;
        tracing::debug!(collection_id = %collection_id, "Lexical index invalidated");
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Whether an index for the collection is currently cached.
    pub async fn contains(&self, collection_id: &str) -> bool {
        self.cache.get(collection_id).await.is_some()
    }
}
