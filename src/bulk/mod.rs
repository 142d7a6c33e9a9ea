//! Query-driven bulk mutations
//!
//! A [`BulkJob`] pairs a query with a mutation that makes matching documents
//! stop matching. The [`BulkJobRunner`] loops over it:
//!
//! ```text
//! Idle ──► Querying ──(hits)──► Mutating ──┐
//!             ▲                            │
//!             └────────────────────────────┘
//!          Querying ──(no hits)──► Done
//!          any request fails   ──► Failed
//! ```
//!
//! The same query is re-run every round; the set it matches shrinks by the
//! batch just mutated, so the loop ends. A configurable iteration cap stops
//! jobs whose mutation does not shrink the set.

mod error;
mod job;
mod runner;

pub use error::{JobError, JobResult};
pub use job::{BulkJob, JobEvent, JobId, JobProgress, JobReport, JobState};
pub use runner::BulkJobRunner;
