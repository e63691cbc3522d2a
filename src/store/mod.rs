/// Chunk store abstraction layer
///
/// Chunks are written by an external ingestion pipeline; this crate only reads them.
/// The lexical index builder lists whole collections, and the hybrid retriever
/// hydrates fused candidates by id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

pub mod memory;
pub mod postgres;

/// An immutable unit of retrievable text with provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique within a collection
    pub id: String,
    /// Tenant/group scope
    pub collection_id: String,
    /// Originating document or message-batch id
    pub source_id: String,
    /// Free-text provenance tag (section title, sender name, ...)
    pub header: String,
    /// UTF-8 content
    pub text: String,
    /// Ordering within the source
    pub sequence_index: i64,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        collection_id: impl Into<String>,
        source_id: impl Into<String>,
        header: impl Into<String>,
        text: impl Into<String>,
        sequence_index: i64,
    ) -> Self {
        Chunk {
            id: id.into(),
            collection_id: collection_id.into(),
            source_id: source_id.into(),
            header: header.into(),
            text: text.into(),
            sequence_index,
        }
    }
}

/// Read-only access to chunk persistence.
///
/// All implementations must be Send + Sync to support concurrent queries.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// List every chunk of a collection, ordered by source and sequence index.
    async fn list_chunks(&self, collection_id: &str) -> Result<Vec<Chunk>, RagError>;

    /// Fetch the chunks with the given ids. Unknown ids are skipped; order is unspecified.
    async fn get_chunks(&self, collection_id: &str, ids: &[String]) -> Result<Vec<Chunk>, RagError>;
}
