//! The page of events currently on screen
//!
//! [`ResultSetController`] is the only writer of the [`ResultSet`]: loads
//! replace it wholesale, single-event actions remove records, and bulk
//! responses are reconciled item by item so partial failures stay visible.

mod controller;

pub use controller::{ItemFailure, LoadOutcome, ReconcileReport, ResultSet, ResultSetController};
