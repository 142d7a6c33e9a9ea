//! Common test utilities
//!
//! [`MemoryIndex`] is an in-memory [`SearchClient`] that evaluates the term
//! and range filters the query builder emits, so bulk jobs see their result
//! set shrink exactly as they would against a real cluster.

#![allow(dead_code)]

use alert_triage::config::Config;
use alert_triage::models::{lookup_path, parse_timestamp, DocumentRef};
use alert_triage::search::{
    AggregationResponse, BulkItem, BulkMutation, BulkResponse, DeleteByQueryResponse,
    HitListResponse, ItemOutcome, QueryDocument, QueryKind, RawHit, SearchClient, SearchResponse,
    SearchResult, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

pub const INDEX: &str = "logstash-2016.09.15";

#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub id: String,
    pub source: Value,
}

#[derive(Default)]
pub struct MemoryIndex {
    docs: Mutex<Vec<StoredDoc>>,
    aggregation: Mutex<Option<Value>>,
    failing_ids: Mutex<HashSet<String>>,
    vanishing_ids: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    search_calls: AtomicUsize,
    bulk_batches: Mutex<Vec<usize>>,
    severity_lookups: Mutex<Vec<String>>,
    deleted_by_query: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` inbox alerts, newest first, one second apart
    pub fn with_inbox_alerts(count: usize) -> Self {
        let index = Self::new();
        for i in 0..count {
            index.insert(format!("evt-{}", i), alert(i, &["inbox"]));
        }
        index
    }

    pub fn insert(&self, id: impl Into<String>, source: Value) {
        self.docs.lock().push(StoredDoc {
            id: id.into(),
            source,
        });
    }

    /// Canned response for every aggregation query
    pub fn set_aggregation(&self, response: Value) {
        *self.aggregation.lock() = Some(response);
    }

    /// Bulk items for this document come back with status 409
    pub fn fail_document(&self, id: &str) {
        self.failing_ids.lock().insert(id.to_string());
    }

    /// Another client deletes this document just before the next bulk
    /// request is applied
    pub fn vanish_before_bulk(&self, id: &str) {
        self.vanishing_ids.lock().insert(id.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, AtomicOrdering::SeqCst);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(AtomicOrdering::SeqCst)
    }

    /// Target count of every bulk request, in order
    pub fn bulk_batches(&self) -> Vec<usize> {
        self.bulk_batches.lock().clone()
    }

    /// Signatures of every severity lookup received
    pub fn severity_lookups(&self) -> Vec<String> {
        self.severity_lookups.lock().clone()
    }

    pub fn deleted_by_query(&self) -> usize {
        self.deleted_by_query.load(AtomicOrdering::SeqCst)
    }

    pub fn doc(&self, id: &str) -> Option<StoredDoc> {
        self.docs.lock().iter().find(|doc| doc.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn count_tagged(&self, tag: &str) -> usize {
        self.docs
            .lock()
            .iter()
            .filter(|doc| has_tag(&doc.source, tag))
            .count()
    }

    fn check_reachable(&self) -> SearchResult<()> {
        if self.unreachable.load(AtomicOrdering::SeqCst) {
            return Err(TransportError::unreachable("connection refused").into());
        }
        Ok(())
    }

    fn matching(&self, query: &QueryDocument) -> Vec<StoredDoc> {
        let filters = query.filters();
        let mut matched: Vec<StoredDoc> = self
            .docs
            .lock()
            .iter()
            .filter(|doc| filters.iter().all(|filter| matches_filter(&doc.source, filter)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let a = timestamp_millis(a.source.get("@timestamp"));
            let b = timestamp_millis(b.source.get("@timestamp"));
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        });
        matched
    }
}

#[async_trait]
impl SearchClient for MemoryIndex {
    fn endpoint(&self) -> &str {
        "http://memory:9200"
    }

    async fn execute(&self, query: &QueryDocument) -> SearchResult<SearchResponse> {
        self.search_calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_reachable()?;

        if let QueryKind::Aggregations(_) = query.kind() {
            let canned = self
                .aggregation
                .lock()
                .clone()
                .unwrap_or_else(|| json!({"aggregations": {"signature": {"buckets": []}}}));
            let response: AggregationResponse = serde_json::from_value(canned).unwrap();
            return Ok(SearchResponse::Aggregations(response));
        }

        if let Some(signature) = signature_term(query) {
            self.severity_lookups.lock().push(signature);
        }

        let matched = self.matching(query);
        let total = matched.len() as u64;
        let from = query.offset().unwrap_or(0) as usize;
        let size = query.size().unwrap_or(10) as usize;
        let hits = matched
            .into_iter()
            .skip(from)
            .take(size)
            .map(|doc| RawHit::new(doc.id, INDEX, doc.source))
            .collect();

        Ok(SearchResponse::Hits(HitListResponse::new(total, hits)))
    }

    async fn bulk_mutate(
        &self,
        targets: &[DocumentRef],
        mutation: &BulkMutation,
    ) -> SearchResult<BulkResponse> {
        self.check_reachable()?;
        self.bulk_batches.lock().push(targets.len());

        let failing = self.failing_ids.lock().clone();
        let vanishing: HashSet<String> = self.vanishing_ids.lock().drain().collect();
        let mut docs = self.docs.lock();
        docs.retain(|doc| !vanishing.contains(&doc.id));
        let mut items = Vec::with_capacity(targets.len());

        for target in targets {
            let position = docs.iter().position(|doc| doc.id == target.id);
            let outcome = match position {
                _ if failing.contains(&target.id) => ItemOutcome::with_status(target.id.clone(), 409),
                None => {
                    let mut outcome = ItemOutcome::with_status(target.id.clone(), 404);
                    if matches!(mutation, BulkMutation::Delete) {
                        outcome.found = Some(false);
                    }
                    outcome
                }
                Some(position) => {
                    match mutation {
                        BulkMutation::Delete => {
                            docs.remove(position);
                        }
                        BulkMutation::AddTag(tag) => set_tag(&mut docs[position].source, tag, true),
                        BulkMutation::RemoveTag(tag) => set_tag(&mut docs[position].source, tag, false),
                    }
                    ItemOutcome::ok(target.id.clone())
                }
            };

            items.push(match mutation {
                BulkMutation::Delete => BulkItem::Delete(outcome),
                _ => BulkItem::Update(outcome),
            });
        }

        Ok(BulkResponse {
            took: 1,
            errors: items.iter().any(|item| !item.outcome().is_success()),
            items,
        })
    }

    async fn delete_by_query(&self, query: &QueryDocument) -> SearchResult<DeleteByQueryResponse> {
        self.check_reachable()?;
        let filters = query.filters().to_vec();
        let mut docs = self.docs.lock();
        let before = docs.len();
        docs.retain(|doc| !filters.iter().all(|filter| matches_filter(&doc.source, filter)));
        let deleted = (before - docs.len()) as u64;
        self.deleted_by_query
            .fetch_add(deleted as usize, AtomicOrdering::SeqCst);

        Ok(DeleteByQueryResponse {
            took: 1,
            deleted,
            total: deleted,
        })
    }
}

/// Alert `i` positions back from the newest, tagged with `tags`
pub fn alert(i: usize, tags: &[&str]) -> Value {
    json!({
        "@timestamp": format!("2016-09-15T11:{:02}:{:02}.000000-0600", 59 - i / 60, 59 - i % 60),
        "event_type": "alert",
        "src_ip": format!("10.0.0.{}", i % 250),
        "alert": {"signature": format!("ET TEST {}", i % 3), "severity": 2},
        "tags": tags,
    })
}

/// Built-in configuration with a small bulk batch
pub fn test_config(batch_size: u32) -> Config {
    let mut config = Config::builtin().unwrap();
    config.bulk.batch_size = batch_size;
    config.bulk.max_iterations = 100;
    config.bulk.server_delete_by_query = false;
    config
}

fn matches_filter(source: &Value, filter: &Value) -> bool {
    if let Some(term) = filter.get("term").and_then(Value::as_object) {
        return term.iter().all(|(field, expected)| match lookup_path(source, field) {
            Some(Value::Array(values)) => values.contains(expected),
            Some(value) => value == expected,
            None => false,
        });
    }

    if let Some(range) = filter.get("range").and_then(Value::as_object) {
        return range.iter().all(|(field, bounds)| {
            let value = timestamp_millis(lookup_path(source, field));
            let upper = timestamp_millis(bounds.get("lte"));
            match (value, upper) {
                (Some(value), Some(upper)) => value <= upper,
                _ => false,
            }
        });
    }

    true
}

/// Epoch milliseconds from either a timestamp string or a number
fn timestamp_millis(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(raw) => parse_timestamp(raw).map(|ts| ts.timestamp_millis() as f64),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn signature_term(query: &QueryDocument) -> Option<String> {
    query.filters().iter().find_map(|filter| {
        filter
            .pointer("/term/alert.signature.raw")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

fn has_tag(source: &Value, tag: &str) -> bool {
    source
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().any(|t| t == tag))
        .unwrap_or(false)
}

fn set_tag(source: &mut Value, tag: &str, present: bool) {
    let tags = source
        .as_object_mut()
        .map(|map| map.entry("tags").or_insert_with(|| json!([])));
    if let Some(Value::Array(tags)) = tags {
        tags.retain(|t| t != tag);
        if present {
            tags.push(json!(tag));
        }
    }
}
