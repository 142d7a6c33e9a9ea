//! Query document construction
//!
//! Every query is a `bool` query whose `must` clause is the user's
//! `query_string` and whose `filter` list is ANDed together: the fixed
//! filters implied by the view first, then the structural filters from the
//! search form.

use crate::config::SearchSettings;
use crate::models::{AggregationMode, AggregationRow, FilterClause, SearchForm, View, INBOX_TAG};
use serde_json::{json, Value};

/// What a query asks the engine for, and so which response it gets back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Hits,
    Aggregations(AggregationMode),
}

/// Engine-facing query body tagged with the response kind it expects
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDocument {
    kind: QueryKind,
    body: Value,
}

impl QueryDocument {
    pub fn new(kind: QueryKind, body: Value) -> Self {
        Self { kind, body }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Requested page size, if any
    pub fn size(&self) -> Option<u64> {
        self.body.get("size").and_then(Value::as_u64)
    }

    /// Requested offset, if any
    pub fn offset(&self) -> Option<u64> {
        self.body.get("from").and_then(Value::as_u64)
    }

    /// Filter clauses of the bool query
    pub fn filters(&self) -> &[Value] {
        self.body
            .pointer("/query/bool/filter")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Full-text clause of the bool query
    pub fn query_string(&self) -> Option<&str> {
        self.body
            .pointer("/query/bool/must/query_string/query")
            .and_then(Value::as_str)
    }

    /// Turn a filter-only query into one page of addressing-only hits,
    /// newest first.
    pub fn paged(mut self, size: u32, timestamp_field: &str) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert("size".to_string(), json!(size));
            map.insert("_source".to_string(), json!(false));
            map.insert("sort".to_string(), timestamp_desc(timestamp_field));
        }
        self.kind = QueryKind::Hits;
        self
    }
}

/// Field names the builder targets
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFields {
    pub timestamp: String,
    pub signature: String,
    pub source_address: String,
    pub severity: String,
    pub tags: String,
    pub event_type: String,
}

impl From<&SearchSettings> for QueryFields {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            timestamp: settings.timestamp_field.clone(),
            signature: settings.signature_field.clone(),
            source_address: settings.source_address_field.clone(),
            severity: settings.severity_field.clone(),
            tags: settings.tags_field.clone(),
            event_type: settings.event_type.clone(),
        }
    }
}

/// Filters every query in a view carries regardless of the form
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFilters {
    clauses: Vec<Value>,
}

impl FixedFilters {
    pub fn for_view(view: View, fields: &QueryFields) -> Self {
        let mut clauses = vec![json!({"term": {"event_type": fields.event_type}})];
        if let Some(tag) = view.required_tag() {
            clauses.push(term(&fields.tags, json!(tag)));
        }
        Self { clauses }
    }

    pub fn clauses(&self) -> &[Value] {
        &self.clauses
    }
}

/// Builds query documents from a search form
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    fields: QueryFields,
    bucket_size: u64,
}

impl QueryBuilder {
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            fields: QueryFields::from(settings),
            bucket_size: settings.aggregation_bucket_size,
        }
    }

    pub fn fields(&self) -> &QueryFields {
        &self.fields
    }

    /// Main search: one page of hits, or an aggregation when the form asks
    /// for one.
    pub fn build(&self, form: &SearchForm, fixed: &FixedFilters) -> QueryDocument {
        let mut filters: Vec<Value> = fixed.clauses().to_vec();
        filters.extend(form.filters.iter().map(|clause| self.filter_clause(clause)));

        let mut body = json!({
            "query": bool_query(form.effective_query(), filters),
        });

        match form.aggregate_by {
            AggregationMode::None => {
                body["size"] = json!(form.page_size);
                body["from"] = json!(form.offset());
                body["sort"] = timestamp_desc(&self.fields.timestamp);
                QueryDocument::new(QueryKind::Hits, body)
            }
            mode => {
                body["size"] = json!(0);
                body["aggs"] = self.aggregations(mode);
                QueryDocument::new(QueryKind::Aggregations(mode), body)
            }
        }
    }

    /// Query matching inbox events up to the newest one currently shown.
    ///
    /// Archiving removes the `inbox` tag, so each batch drops out of the
    /// next run of this same query.
    pub fn archive_by_query(&self, form: &SearchForm, newest: &Value, batch_size: u32) -> QueryDocument {
        let filters = vec![
            term(&self.fields.tags, json!(INBOX_TAG)),
            self.timestamp_upper_bound(newest),
        ];
        let body = json!({"query": bool_query(form.effective_query(), filters)});
        QueryDocument::new(QueryKind::Hits, body).paged(batch_size, &self.fields.timestamp)
    }

    /// Query matching everything the current search shows, up to the newest
    /// event currently shown. Filter-only; see [`QueryDocument::paged`] to run
    /// it client-side.
    pub fn delete_by_query(&self, form: &SearchForm, fixed: &FixedFilters, newest: &Value) -> QueryDocument {
        let mut filters: Vec<Value> = fixed.clauses().to_vec();
        filters.extend(form.filters.iter().map(|clause| self.filter_clause(clause)));
        filters.push(self.timestamp_upper_bound(newest));

        let body = json!({"query": bool_query(form.effective_query(), filters)});
        QueryDocument::new(QueryKind::Hits, body)
    }

    /// Top-1 lookup of the newest event in a facet, returning only its
    /// severity.
    pub fn severity_lookup(&self, row: &AggregationRow) -> QueryDocument {
        let mut filters = vec![term(&self.fields.signature, json!(row.signature))];
        if let Some(last_seen) = row.last_seen {
            filters.push(json!({"range": {self.fields.timestamp.as_str(): {"lte": last_seen}}}));
        }
        if let Some(source) = &row.source_address {
            filters.push(term(&self.fields.source_address, json!(source)));
        }

        let body = json!({
            "query": {"bool": {"filter": filters}},
            "size": 1,
            "sort": timestamp_desc(&self.fields.timestamp),
            "_source": [self.fields.severity],
        });
        QueryDocument::new(QueryKind::Hits, body)
    }

    pub fn filter_clause(&self, clause: &FilterClause) -> Value {
        match clause {
            FilterClause::Term { field, value } => term(field, value.clone()),
            FilterClause::Tag { tag } => term(&self.fields.tags, json!(tag)),
        }
    }

    fn timestamp_upper_bound(&self, newest: &Value) -> Value {
        json!({"range": {self.fields.timestamp.as_str(): {"lte": newest}}})
    }

    fn aggregations(&self, mode: AggregationMode) -> Value {
        let last_timestamp = json!({
            "last_timestamp": {"max": {"field": self.fields.timestamp}}
        });

        let inner = match mode {
            AggregationMode::BySignatureAndSource => json!({
                "source_addrs": {
                    "terms": {"field": self.fields.source_address, "size": self.bucket_size},
                    "aggs": last_timestamp,
                }
            }),
            _ => last_timestamp,
        };

        json!({
            "signature": {
                "terms": {"field": self.fields.signature, "size": self.bucket_size},
                "aggs": inner,
            }
        })
    }
}

fn bool_query(query_string: &str, filters: Vec<Value>) -> Value {
    json!({
        "bool": {
            "must": {"query_string": {"query": query_string}},
            "filter": filters,
        }
    })
}

fn term(field: &str, value: Value) -> Value {
    json!({"term": {field: value}})
}

fn timestamp_desc(field: &str) -> Value {
    json!([{field: {"order": "desc"}}])
}
