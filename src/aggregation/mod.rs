//! Aggregated (faceted) views of the alert stream
//!
//! Bucket trees returned by the engine are flattened into one
//! [`AggregationRow`](crate::models::AggregationRow) per leaf and sorted
//! client-side. Severities are resolved afterwards, one lookup per distinct
//! signature, and memoized for the rest of the session.

mod projector;
mod severity;

pub use projector::{apply_severity, AggregationProjector, SeverityResolved};
pub use severity::{SeverityCache, SeverityLookupError};
