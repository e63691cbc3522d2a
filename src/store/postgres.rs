/// PostgreSQL-backed implementation of ChunkStore
///
/// Uses sqlx with PgPool for connection pooling. Reads from the `doc_chunks`
/// table populated by the ingestion pipeline.

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    Row,
};
use std::time::Duration;

use crate::errors::RagError;
use crate::store::{Chunk, ChunkStore};

/// PostgreSQL-backed chunk store using sqlx connection pool.
pub struct PostgresChunkStore {
    pool: PgPool,
}

impl PostgresChunkStore {
    /// Connect to the PostgreSQL database at database_url.
    pub async fn new(database_url: &str) -> Result<Self, RagError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| RagError::Storage(format!("Failed to connect to database: {}", e)))?;

        Ok(PostgresChunkStore { pool })
    }
}

/// Map a sqlx PgRow to a Chunk struct.
fn row_to_chunk(row: &PgRow) -> Result<Chunk, RagError> {
    Ok(Chunk {
        id: row.try_get("id").map_err(|e| RagError::Storage(e.to_string()))?,
        collection_id: row.try_get("collection_id").map_err(|e| RagError::Storage(e.to_string()))?,
        source_id: row.try_get("source_id").map_err(|e| RagError::Storage(e.to_string()))?,
        header: row
            .try_get::<Option<String>, _>("header")
            .map_err(|e| RagError::Storage(e.to_string()))?
            .unwrap_or_default(),
        text: row.try_get("text").map_err(|e| RagError::Storage(e.to_string()))?,
        sequence_index: row.try_get("sequence_index").map_err(|e| RagError::Storage(e.to_string()))?,
    })
}

#[async_trait]
impl ChunkStore for PostgresChunkStore {
    async fn list_chunks(&self, collection_id: &str) -> Result<Vec<Chunk>, RagError> {
        let rows = sqlx::query(
            "SELECT id, collection_id, source_id, header, text, sequence_index \
             FROM doc_chunks \
             WHERE collection_id = $1 \
             ORDER BY source_id, sequence_index, id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Storage(format!("Failed to list chunks: {}", e)))?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn get_chunks(&self, collection_id: &str, ids: &[String]) -> Result<Vec<Chunk>, RagError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, collection_id, source_id, header, text, sequence_index \
             FROM doc_chunks \
             WHERE collection_id = $1 AND id = ANY($2)",
        )
        .bind(collection_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Storage(format!("Failed to fetch chunks: {}", e)))?;

        rows.iter().map(row_to_chunk).collect()
    }
}
