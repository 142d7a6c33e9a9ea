//! HTTP client for Elasticsearch

use crate::config::ElasticsearchConfig;
use crate::metrics::{SEARCH_REQUESTS_TOTAL, SEARCH_REQUEST_DURATION_SECONDS, TRANSPORT_ERRORS_TOTAL};
use crate::models::DocumentRef;
use crate::search::client::SearchClient;
use crate::search::error::{SearchError, SearchResult, TransportError};
use crate::search::mutation::BulkMutation;
use crate::search::query::{QueryDocument, QueryKind};
use crate::search::response::{BulkResponse, DeleteByQueryResponse, SearchResponse};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Elasticsearch client over HTTP
#[derive(Clone)]
pub struct ElasticClient {
    client: Client,
    base_url: String,
    index: String,
}

impl ElasticClient {
    /// Create a new client
    pub fn new(config: &ElasticsearchConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("alert-triage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::from)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    fn index_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.index, endpoint)
    }

    /// Send a request and decode a successful JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> SearchResult<T> {
        let started = Instant::now();
        let result = self.send_inner(operation, request).await;

        SEARCH_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "ok",
            Err(_) => "error",
        };
        SEARCH_REQUESTS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();

        result
    }

    async fn send_inner<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> SearchResult<T> {
        let response = request.send().await.map_err(|e| {
            let err = TransportError::from(e);
            record_transport_error(operation, &err);
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = TransportError::new(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            );
            record_transport_error(operation, &err);
            debug!(operation, status = status.as_u16(), body = %body, "Search engine rejected request");
            return Err(err.into());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SearchError::decode(operation, e))
    }
}

fn record_transport_error(operation: &'static str, err: &TransportError) {
    let class = if err.is_unreachable() {
        "unreachable"
    } else if err.status >= 500 {
        "server"
    } else {
        "client"
    };
    TRANSPORT_ERRORS_TOTAL.with_label_values(&[operation, class]).inc();
    error!(operation, status = err.status, error = %err, "Search engine request failed");
}

#[async_trait]
impl SearchClient for ElasticClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, query: &QueryDocument) -> SearchResult<SearchResponse> {
        let request = self.client.post(self.index_url("_search")).json(query.body());

        match query.kind() {
            QueryKind::Hits => Ok(SearchResponse::Hits(self.send("search", request).await?)),
            QueryKind::Aggregations(mode) => {
                debug!(mode = %mode, "Executing aggregation query");
                Ok(SearchResponse::Aggregations(
                    self.send("aggregate", request).await?,
                ))
            }
        }
    }

    async fn bulk_mutate(
        &self,
        targets: &[DocumentRef],
        mutation: &BulkMutation,
    ) -> SearchResult<BulkResponse> {
        if targets.is_empty() {
            return Ok(BulkResponse {
                took: 0,
                errors: false,
                items: Vec::new(),
            });
        }

        debug!(targets = targets.len(), mutation = %mutation, "Sending bulk request");

        // refresh so the next search no longer matches mutated documents
        let request = self
            .client
            .post(format!("{}/_bulk?refresh=true", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(mutation.to_ndjson(targets));

        self.send("bulk", request).await
    }

    async fn delete_by_query(&self, query: &QueryDocument) -> SearchResult<DeleteByQueryResponse> {
        let body = serde_json::json!({"query": query.body()["query"]});
        let request = self
            .client
            .post(format!("{}?refresh=true", self.index_url("_delete_by_query")))
            .json(&body);

        self.send("delete_by_query", request).await
    }
}
