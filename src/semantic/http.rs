/// HTTP client for a FAISS-style vector search service
///
/// POST {base_url}/search with `{group_id, vector, k}`. The service answers either
/// `{"ok": true, "results": [...]}` or a bare array; each result carries a `score`
/// (or an L2 `distance`) and the `metadata` object stored at ingestion.
/// Distances are mapped to `1 / (1 + d)` so that higher always means nearer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SemanticHit, VectorSearch, VectorSearchError};

#[derive(Serialize)]
struct SearchRequest<'a> {
    group_id: &'a str,
    vector: &'a [f32],
    k: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { results: Vec<RawHit> },
    Bare(Vec<RawHit>),
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Deserialize, Default)]
struct RawMetadata {
    #[serde(default, rename = "chunkId", alias = "chunk_id")]
    chunk_id: Option<serde_json::Value>,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "fileId", alias = "source_id")]
    source_id: Option<String>,
}

/// Similarity for a hit: `score` as sent, otherwise derived from `distance`.
fn similarity(score: Option<f64>, distance: Option<f64>) -> f64 {
    match (score, distance) {
        (Some(score), _) => score,
        (None, Some(distance)) => 1.0 / (1.0 + distance.max(0.0)),
        (None, None) => 0.0,
    }
}

/// Chunk ids may be stored as strings or numbers.
fn id_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct HttpVectorSearch {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorSearch {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, VectorSearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VectorSearchError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpVectorSearch {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(
        &self,
        collection_key: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SemanticHit>, VectorSearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                group_id: collection_key,
                vector,
                k,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(VectorSearchError::Api { status, message: body });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorSearchError::Request(format!("Failed to parse search response: {}", e)))?;

        let raw = match parsed {
            SearchResponse::Wrapped { results } => results,
            SearchResponse::Bare(results) => results,
        };

        let mut hits = Vec::with_capacity(raw.len());
        for hit in raw {
            let Some(chunk_id) = hit.metadata.chunk_id.and_then(id_to_string) else {
                tracing::warn!(collection_key = %collection_key, "Vector hit without chunk id skipped");
                continue;
            };
            hits.push(SemanticHit {
                chunk_id,
                score: similarity(hit.score, hit.distance),
                header: hit.metadata.header,
                text: hit.metadata.text,
                source_id: hit.metadata.source_id,
            });
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_parses_wrapped_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(serde_json::json!({ "group_id": "chat_g1", "k": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "results": [
                    { "score": 0.9, "metadata": { "chunkId": "c1", "header": "Timeline", "text": "Launch", "fileId": "f1" } },
                    { "score": 0.4, "metadata": { "chunkId": 7 } },
                    { "score": 0.3, "metadata": { "sender": "Kim", "text": "no id" } }
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpVectorSearch::new(server.uri(), Duration::from_secs(5)).unwrap();
        let hits = client.search("chat_g1", &[0.1, 0.2], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c1");
        assert_eq!(hits[0].header.as_deref(), Some("Timeline"));
        assert_eq!(hits[0].source_id.as_deref(), Some("f1"));
        assert_eq!(hits[1].chunk_id, "7");
        assert!((hits[1].score - 0.4).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_search_parses_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "distance": 1.0, "metadata": { "chunk_id": "x" } }
            ])))
            .mount(&server)
            .await;

        let client = HttpVectorSearch::new(server.uri(), Duration::from_secs(5)).unwrap();
        let hits = client.search("g1", &[1.0], 5).await.unwrap();
        assert_eq!(hits, vec![SemanticHit::new("x", 0.5)]);
    }

    #[tokio::test]
    async fn test_nearest_distance_fuses_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "distance": 4.0, "metadata": { "chunkId": "far" } },
                { "distance": 0.05, "metadata": { "chunkId": "near" } }
            ])))
            .mount(&server)
            .await;

        let client = HttpVectorSearch::new(server.uri(), Duration::from_secs(5)).unwrap();
        let hits = client.search("g1", &[1.0], 2).await.unwrap();
        assert!(hits.iter().find(|h| h.chunk_id == "near").unwrap().score
            > hits.iter().find(|h| h.chunk_id == "far").unwrap().score);

        let semantic: Vec<(String, f64)> = hits.iter().map(|h| (h.chunk_id.clone(), h.score)).collect();
        let fused = crate::search::fuse_scores(&semantic, &[], 1.0, 2);
        assert_eq!(fused[0].chunk_id, "near");
        assert_eq!(fused[1].chunk_id, "far");
    }

    #[test]
    fn test_similarity_prefers_score_over_distance() {
        assert_eq!(similarity(Some(0.8), Some(3.0)), 0.8);
        assert_eq!(similarity(None, Some(0.0)), 1.0);
        assert_eq!(similarity(None, None), 0.0);
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("index missing"))
            .mount(&server)
            .await;

        let client = HttpVectorSearch::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.search("g1", &[1.0], 5).await.unwrap_err();
        assert!(matches!(err, VectorSearchError::Api { status: 500, .. }));
    }
}
