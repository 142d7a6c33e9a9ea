//! Search engine client abstraction

use crate::models::DocumentRef;
use crate::search::error::{SearchError, SearchResult};
use crate::search::mutation::BulkMutation;
use crate::search::query::QueryDocument;
use crate::search::response::{
    AggregationResponse, BulkResponse, DeleteByQueryResponse, HitListResponse, SearchResponse,
};
use async_trait::async_trait;

/// Everything the console needs from the search engine.
///
/// Implementations decode a search response according to the
/// [`QueryKind`](crate::search::QueryKind) of the query that was sent.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Endpoint named in "no response" notifications
    fn endpoint(&self) -> &str;

    /// Run a search
    async fn execute(&self, query: &QueryDocument) -> SearchResult<SearchResponse>;

    /// Apply one mutation to every target; items come back in target order
    async fn bulk_mutate(
        &self,
        targets: &[DocumentRef],
        mutation: &BulkMutation,
    ) -> SearchResult<BulkResponse>;

    /// Server-side delete of everything the query matches
    async fn delete_by_query(&self, query: &QueryDocument) -> SearchResult<DeleteByQueryResponse>;

    /// Run a search that must return hits
    async fn search_hits(&self, query: &QueryDocument) -> SearchResult<HitListResponse> {
        self.execute(query)
            .await?
            .into_hits()
            .ok_or(SearchError::UnexpectedShape { expected: "hit list" })
    }

    /// Run a search that must return aggregations
    async fn search_aggregations(&self, query: &QueryDocument) -> SearchResult<AggregationResponse> {
        self.execute(query)
            .await?
            .into_aggregations()
            .ok_or(SearchError::UnexpectedShape {
                expected: "aggregation",
            })
    }
}
