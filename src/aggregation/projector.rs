//! Aggregation response to table rows

use crate::aggregation::severity::{SeverityCache, SeverityLookupError};
use crate::metrics::SEVERITY_LOOKUPS_TOTAL;
use crate::models::{AggregationMode, AggregationRow, Severity, SortKey, SortOrder};
use crate::search::{AggregationResponse, QueryBuilder, SearchClient};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Severity resolved for the row at `row` in the projected sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityResolved {
    pub row: usize,
    pub severity: Severity,
}

/// Flattens bucket trees into sorted rows and resolves their severities
#[derive(Clone)]
pub struct AggregationProjector {
    client: Arc<dyn SearchClient>,
    builder: QueryBuilder,
}

impl AggregationProjector {
    pub fn new(client: Arc<dyn SearchClient>, builder: QueryBuilder) -> Self {
        Self { client, builder }
    }

    /// One row per leaf bucket, sorted by `sort_by` ascending and reversed
    /// for descending order.
    pub fn project(
        &self,
        response: &AggregationResponse,
        mode: AggregationMode,
        sort_by: SortKey,
        order: SortOrder,
    ) -> Vec<AggregationRow> {
        let mut rows = flatten(response, mode);
        sort_rows(&mut rows, sort_by, order);
        rows
    }

    /// Start one severity lookup per row and return the stream of results.
    ///
    /// Rows are usable immediately; each lookup reports back as soon as it
    /// completes, in no particular order. Rows whose lookup finds nothing
    /// produce no message and stay unresolved. The channel closes once every
    /// lookup has finished.
    pub fn resolve_severities(
        &self,
        rows: &[AggregationRow],
        cache: &SeverityCache,
    ) -> mpsc::UnboundedReceiver<SeverityResolved> {
        let (tx, rx) = mpsc::unbounded_channel();

        for (index, row) in rows.iter().enumerate() {
            let tx = tx.clone();
            let cache = cache.clone();
            let client = Arc::clone(&self.client);
            let query = self.builder.severity_lookup(row);
            let severity_field = self.builder.fields().severity.clone();
            let signature = row.signature.clone();

            tokio::spawn(async move {
                if cache.contains(&signature) {
                    SEVERITY_LOOKUPS_TOTAL.with_label_values(&["cached"]).inc();
                }

                let fetch = async {
                    SEVERITY_LOOKUPS_TOTAL.with_label_values(&["fetched"]).inc();
                    let hits = client.search_hits(&query).await?;
                    hits.hits
                        .hits
                        .first()
                        .and_then(|hit| hit.field(&severity_field))
                        .and_then(severity_value)
                        .ok_or_else(|| SeverityLookupError::NotFound(signature.clone()))
                };

                match cache.get_or_fetch(&signature, fetch).await {
                    Ok(severity) => {
                        let _ = tx.send(SeverityResolved { row: index, severity });
                    }
                    Err(err) => match err.as_ref() {
                        SeverityLookupError::NotFound(_) => {
                            SEVERITY_LOOKUPS_TOTAL.with_label_values(&["not_found"]).inc();
                            debug!(signature = %signature, "No severity found for signature");
                        }
                        SeverityLookupError::Search(e) => {
                            SEVERITY_LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
                            warn!(signature = %signature, error = %e, "Severity lookup failed");
                        }
                    },
                }
            });
        }

        rx
    }

    /// Project and wait for every severity lookup, patching rows in place
    pub async fn project_resolved(
        &self,
        response: &AggregationResponse,
        mode: AggregationMode,
        sort_by: SortKey,
        order: SortOrder,
        cache: &SeverityCache,
    ) -> Vec<AggregationRow> {
        let mut rows = self.project(response, mode, sort_by, order);
        let mut updates = self.resolve_severities(&rows, cache);
        while let Some(update) = updates.recv().await {
            apply_severity(&mut rows, update);
        }
        rows
    }
}

/// Patch one row with a resolved severity; stale indices are ignored
pub fn apply_severity(rows: &mut [AggregationRow], update: SeverityResolved) -> bool {
    match rows.get_mut(update.row) {
        Some(row) => {
            row.severity = Some(update.severity);
            true
        }
        None => false,
    }
}

fn flatten(response: &AggregationResponse, mode: AggregationMode) -> Vec<AggregationRow> {
    let buckets = &response.aggregations.signature.buckets;

    match mode {
        AggregationMode::None => Vec::new(),
        AggregationMode::BySignature => buckets
            .iter()
            .map(|bucket| {
                AggregationRow::new(
                    bucket.key.clone(),
                    bucket.last_timestamp.and_then(|metric| metric.value),
                    bucket.doc_count,
                )
            })
            .collect(),
        AggregationMode::BySignatureAndSource => buckets
            .iter()
            .flat_map(|signature| {
                signature
                    .source_addrs
                    .iter()
                    .flat_map(|sources| sources.buckets.iter())
                    .map(move |source| {
                        AggregationRow::new(
                            signature.key.clone(),
                            source.last_timestamp.and_then(|metric| metric.value),
                            source.doc_count,
                        )
                        .with_source(source.key.clone())
                    })
            })
            .collect(),
    }
}

/// Stable ascending sort, then a plain reverse for descending order
fn sort_rows(rows: &mut [AggregationRow], sort_by: SortKey, order: SortOrder) {
    match sort_by {
        SortKey::LastSeen => rows.sort_by(|a, b| cmp_optional_f64(a.last_seen, b.last_seen)),
        SortKey::Count => rows.sort_by_key(|row| row.count),
        SortKey::Message => rows.sort_by(|a, b| a.signature.cmp(&b.signature)),
        SortKey::SourceAddress => rows.sort_by(|a, b| a.source_address.cmp(&b.source_address)),
    }

    if order == SortOrder::Desc {
        rows.reverse();
    }
}

/// Missing timestamps sort first
fn cmp_optional_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Severity stored as a number, or as a numeric string
fn severity_value(value: &Value) -> Option<Severity> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| Severity::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        Value::Array(values) => values.first().and_then(severity_value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> AggregationResponse {
        serde_json::from_value(value).unwrap()
    }

    fn signature_buckets() -> AggregationResponse {
        response(json!({"aggregations": {"signature": {"buckets": [
            {"key": "b-sig", "doc_count": 5, "last_timestamp": {"value": 3000.0}},
            {"key": "a-sig", "doc_count": 12, "last_timestamp": {"value": 1000.0}},
            {"key": "c-sig", "doc_count": 5, "last_timestamp": {"value": 2000.0}}
        ]}}}))
    }

    fn source_buckets() -> AggregationResponse {
        response(json!({"aggregations": {"signature": {"buckets": [
            {"key": "sig-1", "doc_count": 4, "source_addrs": {"buckets": [
                {"key": "10.0.0.2", "doc_count": 3, "last_timestamp": {"value": 500.0}},
                {"key": "10.0.0.1", "doc_count": 1, "last_timestamp": {"value": 900.0}}
            ]}},
            {"key": "sig-2", "doc_count": 2, "source_addrs": {"buckets": [
                {"key": "10.0.0.3", "doc_count": 2, "last_timestamp": {"value": 700.0}}
            ]}}
        ]}}}))
    }

    #[test]
    fn test_flatten_one_row_per_leaf() {
        assert_eq!(flatten(&signature_buckets(), AggregationMode::BySignature).len(), 3);

        let rows = flatten(&source_buckets(), AggregationMode::BySignatureAndSource);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].signature, "sig-1");
        assert_eq!(rows[0].source_address.as_deref(), Some("10.0.0.2"));
        // each pair keeps its own last-seen metric
        assert_eq!(rows[1].last_seen, Some(900.0));
        assert_eq!(rows[2].signature, "sig-2");
        assert!(rows.iter().all(|row| row.severity.is_none()));
    }

    #[test]
    fn test_flatten_none_mode_is_empty() {
        assert!(flatten(&signature_buckets(), AggregationMode::None).is_empty());
    }

    #[test]
    fn test_sort_keys() {
        let mut rows = flatten(&signature_buckets(), AggregationMode::BySignature);
        sort_rows(&mut rows, SortKey::Message, SortOrder::Asc);
        let keys: Vec<_> = rows.iter().map(|r| r.signature.as_str()).collect();
        assert_eq!(keys, ["a-sig", "b-sig", "c-sig"]);

        sort_rows(&mut rows, SortKey::LastSeen, SortOrder::Asc);
        let seen: Vec<_> = rows.iter().map(|r| r.last_seen.unwrap()).collect();
        assert_eq!(seen, [1000.0, 2000.0, 3000.0]);

        let mut rows = flatten(&source_buckets(), AggregationMode::BySignatureAndSource);
        sort_rows(&mut rows, SortKey::SourceAddress, SortOrder::Asc);
        let sources: Vec<_> = rows.iter().map(|r| r.source_address.clone().unwrap()).collect();
        assert_eq!(sources, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_desc_is_exact_reverse_of_asc() {
        for key in [SortKey::LastSeen, SortKey::Count, SortKey::Message, SortKey::SourceAddress] {
            let mut asc = flatten(&signature_buckets(), AggregationMode::BySignature);
            sort_rows(&mut asc, key, SortOrder::Asc);
            let mut desc = flatten(&signature_buckets(), AggregationMode::BySignature);
            sort_rows(&mut desc, key, SortOrder::Desc);

            asc.reverse();
            assert_eq!(asc, desc, "sort key {}", key);
        }
    }

    #[test]
    fn test_count_ties_keep_reversed_bucket_order() {
        let mut rows = flatten(&signature_buckets(), AggregationMode::BySignature);
        sort_rows(&mut rows, SortKey::Count, SortOrder::Desc);
        let keys: Vec<_> = rows.iter().map(|r| r.signature.as_str()).collect();
        // b-sig and c-sig tie on 5: ascending keeps b before c, reverse flips them
        assert_eq!(keys, ["a-sig", "c-sig", "b-sig"]);
    }

    #[test]
    fn test_missing_last_seen_sorts_first() {
        assert_eq!(cmp_optional_f64(None, Some(1.0)), Ordering::Less);
        assert_eq!(cmp_optional_f64(Some(2.0), Some(1.0)), Ordering::Greater);
    }

    #[test]
    fn test_severity_value_forms() {
        assert_eq!(severity_value(&json!(2)), Some(2));
        assert_eq!(severity_value(&json!("3")), Some(3));
        assert_eq!(severity_value(&json!([1])), Some(1));
        assert_eq!(severity_value(&json!(null)), None);
    }

    #[test]
    fn test_apply_severity_ignores_stale_index() {
        let mut rows = vec![AggregationRow::new("a", None, 1)];
        assert!(apply_severity(&mut rows, SeverityResolved { row: 0, severity: 2 }));
        assert!(!apply_severity(&mut rows, SeverityResolved { row: 5, severity: 2 }));
        assert_eq!(rows[0].severity, Some(2));
    }
}
