//! Search engine access: query construction, typed responses and the client
//!
//! ```text
//! SearchForm ──► QueryBuilder ──► QueryDocument ──► SearchClient ──► SearchResponse
//!                                  (kind + body)        │            ├─ Hits
//!                                                       │            └─ Aggregations
//!                                                       ├─ bulk_mutate ──► BulkResponse
//!                                                       └─ delete_by_query
//! ```
//!
//! # Example
//!
//! ```no_run
//! use alert_triage::config::Config;
//! use alert_triage::models::{SearchForm, View};
//! use alert_triage::search::{ElasticClient, FixedFilters, QueryBuilder, SearchClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let client = ElasticClient::new(&config.elasticsearch)?;
//!     let builder = QueryBuilder::new(&config.search);
//!
//!     let form = SearchForm::new(config.search.page_size).with_query("ET SCAN");
//!     let fixed = FixedFilters::for_view(View::Inbox, builder.fields());
//!     let hits = client.search_hits(&builder.build(&form, &fixed)).await?;
//!     println!("{} matching alerts", hits.total());
//!     Ok(())
//! }
//! ```

mod client;
mod elastic;
mod error;
mod mutation;
mod query;
mod response;

pub use client::SearchClient;
pub use elastic::ElasticClient;
pub use error::{SearchError, SearchResult, TransportError};
pub use mutation::BulkMutation;
pub use query::{FixedFilters, QueryBuilder, QueryDocument, QueryFields, QueryKind};
pub use response::{
    AggregationResponse, Aggregations, BulkItem, BulkResponse, DeleteByQueryResponse, HitListResponse,
    HitTotal, Hits, ItemOutcome, MaxMetric, RawHit, SearchResponse, SignatureBucket, SourceBucket,
    TermsAggregation,
};
