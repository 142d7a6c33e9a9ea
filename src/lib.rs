//! Triage console core for IDS alerts stored in Elasticsearch.
//!
//! Builds search queries from a form, pages through matching events,
//! aggregates them by signature, and archives or deletes them one at a
//! time, by selection, or for everything a query matches.

pub mod aggregation;
pub mod bulk;
pub mod config;
pub mod console;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod results;
pub mod search;

pub use config::Config;
pub use console::{DeleteOutcome, RefreshOutcome, TriageConsole};
pub use error::{AppError, Result};
