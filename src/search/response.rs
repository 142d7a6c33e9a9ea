//! Typed search engine responses
//!
//! A search returns either a hit list or an aggregation tree. Which one is
//! decided by the query that was sent (see [`QueryKind`]), never by probing
//! the body for fields.
//!
//! [`QueryKind`]: crate::search::QueryKind

use crate::models::{lookup_path, DocumentRef, EventRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of executing a query
#[derive(Debug, Clone)]
pub enum SearchResponse {
    Hits(HitListResponse),
    Aggregations(AggregationResponse),
}

impl SearchResponse {
    pub fn into_hits(self) -> Option<HitListResponse> {
        match self {
            SearchResponse::Hits(hits) => Some(hits),
            SearchResponse::Aggregations(_) => None,
        }
    }

    pub fn into_aggregations(self) -> Option<AggregationResponse> {
        match self {
            SearchResponse::Aggregations(aggs) => Some(aggs),
            SearchResponse::Hits(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitListResponse {
    #[serde(default)]
    pub took: u64,
    pub hits: Hits,
}

impl HitListResponse {
    pub fn new(total: u64, hits: Vec<RawHit>) -> Self {
        Self {
            took: 0,
            hits: Hits {
                total: HitTotal::Count(total),
                hits,
            },
        }
    }

    pub fn total(&self) -> u64 {
        self.hits.total.value()
    }

    pub fn len(&self) -> usize {
        self.hits.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.hits.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hits {
    pub total: HitTotal,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

/// Older clusters report a bare count, newer ones an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitTotal {
    Count(u64),
    Object { value: u64 },
}

impl HitTotal {
    pub fn value(&self) -> u64 {
        match self {
            HitTotal::Count(value) | HitTotal::Object { value } => *value,
        }
    }
}

/// One matched document as returned by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_index")]
    pub index: String,

    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl RawHit {
    pub fn new(id: impl Into<String>, index: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            doc_type: None,
            source,
        }
    }

    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            id: self.id.clone(),
            index: self.index.clone(),
            doc_type: self.doc_type.clone(),
        }
    }

    pub fn into_record(self, timestamp_field: &str, tags_field: &str) -> EventRecord {
        let doc = self.document_ref();
        EventRecord::new(doc, self.source, timestamp_field, tags_field)
    }

    pub fn field(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.source, path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResponse {
    pub aggregations: Aggregations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregations {
    pub signature: TermsAggregation<SignatureBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsAggregation<B> {
    #[serde(default = "Vec::new")]
    pub buckets: Vec<B>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBucket {
    pub key: String,
    pub doc_count: u64,

    /// Present in single-level mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<MaxMetric>,

    /// Present in signature+source mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_addrs: Option<TermsAggregation<SourceBucket>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBucket {
    pub key: String,
    pub doc_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<MaxMetric>,
}

/// `max` metric; `value` is null for an empty bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxMetric {
    pub value: Option<f64>,
}

/// Response of a bulk request, one item per target in request order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.outcome().is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    /// Items whose document no longer matches: mutated, or already gone
    pub fn settled(&self) -> usize {
        self.items
            .iter()
            .map(BulkItem::outcome)
            .filter(|outcome| outcome.is_success() || outcome.is_not_found())
            .count()
    }
}

/// A bulk item keyed by the action that was performed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkItem {
    Update(ItemOutcome),
    Delete(ItemOutcome),
    Index(ItemOutcome),
    Create(ItemOutcome),
}

impl BulkItem {
    pub fn outcome(&self) -> &ItemOutcome {
        match self {
            BulkItem::Update(outcome)
            | BulkItem::Delete(outcome)
            | BulkItem::Index(outcome)
            | BulkItem::Create(outcome) => outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    #[serde(rename = "_id")]
    pub id: String,

    pub status: u16,

    /// Legacy delete responses report `found: false` for missing documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ItemOutcome {
    pub fn ok(id: impl Into<String>) -> Self {
        Self::with_status(id, 200)
    }

    pub fn with_status(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            found: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.found != Some(false)
    }

    /// The target document did not exist when the item was applied
    pub fn is_not_found(&self) -> bool {
        self.status == 404 || self.found == Some(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteByQueryResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_total_both_forms() {
        let legacy: HitListResponse =
            serde_json::from_value(json!({"hits": {"total": 7, "hits": []}})).unwrap();
        assert_eq!(legacy.total(), 7);

        let modern: HitListResponse = serde_json::from_value(
            json!({"hits": {"total": {"value": 9, "relation": "eq"}, "hits": []}}),
        )
        .unwrap();
        assert_eq!(modern.total(), 9);
    }

    #[test]
    fn test_raw_hit_to_record() {
        let hit: RawHit = serde_json::from_value(json!({
            "_id": "AVc1",
            "_index": "logstash-2016.09.15",
            "_type": "log",
            "_source": {"@timestamp": "2016-09-15T11:23:20.197956-0600"}
        }))
        .unwrap();

        let record = hit.into_record("@timestamp", "tags");
        assert_eq!(record.doc.doc_type.as_deref(), Some("log"));
        assert!(record.timestamp.is_some());
        assert_eq!(record.source["tags"], json!([]));
    }

    #[test]
    fn test_bulk_items_decode() {
        let response: BulkResponse = serde_json::from_value(json!({
            "took": 3,
            "errors": true,
            "items": [
                {"update": {"_id": "a", "status": 200}},
                {"update": {"_id": "b", "status": 409, "error": {"type": "version_conflict_engine_exception"}}},
                {"delete": {"_id": "c", "status": 404, "found": false}}
            ]
        }))
        .unwrap();

        assert_eq!(response.items.len(), 3);
        assert_eq!(response.succeeded(), 1);
        assert_eq!(response.failed(), 2);
        assert_eq!(response.settled(), 2);
        assert_eq!(response.items[1].outcome().id, "b");
        assert!(!response.items[1].outcome().is_not_found());
        assert!(response.items[2].outcome().is_not_found());
    }

    #[test]
    fn test_two_level_buckets_decode() {
        let response: AggregationResponse = serde_json::from_value(json!({
            "aggregations": {"signature": {"buckets": [
                {"key": "ET SCAN", "doc_count": 3, "source_addrs": {"buckets": [
                    {"key": "10.0.0.1", "doc_count": 2, "last_timestamp": {"value": 1000.0}},
                    {"key": "10.0.0.2", "doc_count": 1, "last_timestamp": {"value": null}}
                ]}}
            ]}}
        }))
        .unwrap();

        let bucket = &response.aggregations.signature.buckets[0];
        let sources = bucket.source_addrs.as_ref().unwrap();
        assert_eq!(sources.buckets.len(), 2);
        assert_eq!(sources.buckets[1].last_timestamp, Some(MaxMetric { value: None }));
    }
}
