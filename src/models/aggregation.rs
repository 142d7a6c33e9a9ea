use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity as recorded by the IDS (1 is the most severe)
pub type Severity = u32;

/// One flattened facet of an aggregation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRow {
    /// Classification key
    pub signature: String,

    /// Present only when grouping by signature and source address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    /// Newest event in the bucket, epoch milliseconds
    pub last_seen: Option<f64>,

    /// Matching events in the bucket
    pub count: u64,

    /// Resolved lazily, absent until the lookup completes
    pub severity: Option<Severity>,
}

impl AggregationRow {
    pub fn new(signature: impl Into<String>, last_seen: Option<f64>, count: u64) -> Self {
        Self {
            signature: signature.into(),
            source_address: None,
            last_seen,
            count,
            severity: None,
        }
    }

    pub fn with_source(mut self, source_address: impl Into<String>) -> Self {
        self.source_address = Some(source_address.into());
        self
    }

    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        self.last_seen
            .and_then(|millis| DateTime::from_timestamp_millis(millis as i64))
    }
}
