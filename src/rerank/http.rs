/// HTTP client for the cross-encoder reranking service
///
/// POST {base_url}/rerank with `{query, texts}`; the service answers
/// `{"results": [{"text": ..., "score": ...}]}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RerankError, RerankScore, RerankerService};

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankScore>,
}

pub struct HttpRerankerService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRerankerService {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, RerankError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RerankError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpRerankerService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RerankerService for HttpRerankerService {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<RerankScore>, RerankError> {
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&RerankRequest {
                query,
                texts: passages,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RerankError::Api { status, message: body });
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::Request(format!("Failed to parse rerank response: {}", e)))?;

        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_rerank_request_shape_and_parse() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_json(serde_json::json!({
                "query": "launch date",
                "texts": ["Launch date is March 1", "Budget approved"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "text": "Launch date is March 1", "score": 0.97 },
                    { "text": "Budget approved", "score": 0.02 }
                ]
            })))
            .mount(&server)
            .await;

        let service = HttpRerankerService::new(server.uri(), Duration::from_secs(5)).unwrap();
        let scores = service
            .rerank(
                "launch date",
                &["Launch date is March 1".to_string(), "Budget approved".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].text, "Launch date is March 1");
        assert!((scores[0].score - 0.97).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_rerank_timeout_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "results": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let service = HttpRerankerService::new(server.uri(), Duration::from_millis(50)).unwrap();
        let err = service.rerank("q", &["p".to_string()]).await.unwrap_err();
        assert!(matches!(err, RerankError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_rerank_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let service = HttpRerankerService::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = service.rerank("q", &["p".to_string()]).await.unwrap_err();
        assert!(matches!(err, RerankError::Api { status: 503, .. }));
    }
}
