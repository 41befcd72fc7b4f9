//! HTTP-backed knowledge source.
//!
//! Each registered source exposes a search endpoint that accepts a JSON
//! [`SearchParams`] body and answers with a JSON list of [`SearchResult`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use kbchat_shared::{KbChatError, Result, SearchResult};

use crate::source::{KnowledgeSearch, SearchParams, SourceRegistry};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("kbchat/", env!("CARGO_PKG_VERSION"));

/// Searches knowledge sources over HTTP, one endpoint per registered source.
pub struct HttpSearchSource {
    client: Client,
    registry: SourceRegistry,
}

impl HttpSearchSource {
    /// Create a source backed by the endpoints in `registry`.
    pub fn new(registry: SourceRegistry, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| KbChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, registry })
    }

    fn endpoint_for(&self, source_id: &str) -> Result<Url> {
        let source = self.registry.get(source_id).ok_or_else(|| {
            KbChatError::configuration_missing(source_id, "no search endpoint configured")
        })?;
        Url::parse(&source.endpoint).map_err(|e| {
            KbChatError::configuration_missing(
                source_id,
                format!("invalid endpoint {}: {e}", source.endpoint),
            )
        })
    }
}

#[async_trait]
impl KnowledgeSearch for HttpSearchSource {
    #[instrument(skip_all, fields(source_id = %source_id, match_count = params.match_count))]
    async fn search(&self, source_id: &str, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let endpoint = self.endpoint_for(source_id)?;
        debug!(%endpoint, "querying knowledge source");

        let response = self
            .client
            .post(endpoint.as_str())
            .json(params)
            .send()
            .await
            .map_err(|e| KbChatError::source_failure(source_id, format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KbChatError::source_failure(
                source_id,
                format!("{endpoint}: HTTP {status}"),
            ));
        }

        let results: Vec<SearchResult> = response.json().await.map_err(|e| {
            KbChatError::source_failure(source_id, format!("{endpoint}: invalid response body: {e}"))
        })?;

        debug!(results = results.len(), "knowledge source answered");
        Ok(results)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> HttpSearchSource {
        let mut registry = SourceRegistry::new();
        registry.register("kb-docs", &format!("{}/search", server.uri()), None);
        HttpSearchSource::new(registry, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_params_and_decodes_results() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(serde_json::json!({
                "query_text": "how do I reset my password",
                "match_count": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "c-1", "content": "Open settings.", "score": 0.91,
                 "chunk_type": "faq", "knowledge_id": "k-1", "knowledge_title": "FAQ"},
                {"id": "c-2", "content": "Passwords expire.", "score": 0.55}
            ])))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let params = SearchParams::new("how do I reset my password", 3);
        let results = source.search("kb-docs", &params).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "c-1");
        assert!(results[0].is_faq());
        assert_eq!(results[1].knowledge_title, "");
    }

    #[tokio::test]
    async fn unknown_source_is_configuration_missing() {
        let server = MockServer::start().await;
        let source = source_for(&server);

        let err = source
            .search("kb-graph", &SearchParams::new("q", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, KbChatError::ConfigurationMissing { ref source_id, .. } if source_id == "kb-graph"));
    }

    #[tokio::test]
    async fn http_error_is_source_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source
            .search("kb-docs", &SearchParams::new("q", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, KbChatError::SourceFailure { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn malformed_body_is_source_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source
            .search("kb-docs", &SearchParams::new("q", 10))
            .await
            .unwrap_err();
        assert!(err.is_per_source());
        assert!(err.to_string().contains("invalid response body"));
    }
}
