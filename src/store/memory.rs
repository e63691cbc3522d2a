/// In-process chunk store
///
/// Keeps chunks in insertion order per collection. Useful for embedding the
/// engine without a database and for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::RagError;
use crate::store::{Chunk, ChunkStore};

#[derive(Default)]
pub struct InMemoryChunkStore {
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given chunks.
    pub fn with_chunks(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        let mut collections: HashMap<String, Vec<Chunk>> = HashMap::new();
        for chunk in chunks {
            collections
                .entry(chunk.collection_id.clone())
                .or_default()
                .push(chunk);
        }
        InMemoryChunkStore {
            collections: RwLock::new(collections),
        }
    }

    /// Append a chunk to its collection.
    ///
    /// Cached lexical indexes are not refreshed; call
    /// `LexicalIndexCache::invalidate` after writes.
    pub async fn insert(&self, chunk: Chunk) {
        self.collections
            .write()
            .await
            .entry(chunk.collection_id.clone())
            .or_default()
            .push(chunk);
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn list_chunks(&self, collection_id: &str) -> Result<Vec<Chunk>, RagError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_chunks(&self, collection_id: &str, ids: &[String]) -> Result<Vec<Chunk>, RagError> {
        let collections = self.collections.read().await;
        let Some(chunks) = collections.get(collection_id) else {
            return Ok(Vec::new());
        };
        Ok(chunks
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }
}
