//! Bulk job definitions

use crate::bulk::error::JobError;
use crate::search::{BulkMutation, BulkResponse, QueryDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Unique identifier for a bulk job
pub type JobId = Uuid;

/// Where a job is in its query/mutate loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet started
    Idle,
    /// Waiting on the search for remaining matches
    Querying,
    /// Waiting on the bulk mutation of the current batch
    Mutating,
    /// The query returned no more matches
    Done,
    /// Stopped by an error
    Failed,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Running counters of a job.
///
/// `processed` counts every item a bulk response reports, whether it
/// succeeded or not; `succeeded` and `failed` split that number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed: u64,
    /// Matches reported by the first search, unknown until then
    pub total: Option<u64>,
    pub succeeded: u64,
    pub failed: u64,
}

impl JobProgress {
    pub fn record(&mut self, response: &BulkResponse) {
        let succeeded = response.succeeded() as u64;
        self.processed += response.items.len() as u64;
        self.succeeded += succeeded;
        self.failed += response.items.len() as u64 - succeeded;
    }

    /// Completed fraction in `[0, 1]`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.processed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// One "mutate everything matching this query" action.
///
/// The mutation must make every document it succeeds on stop matching
/// `query` (removing the tag the query filters on, or deleting the
/// document). The runner re-issues the same query after every batch and
/// only stops once it comes back empty.
#[derive(Debug, Clone)]
pub struct BulkJob {
    pub id: JobId,
    pub label: String,
    pub query: QueryDocument,
    pub mutation: BulkMutation,
    pub state: JobState,
    pub progress: JobProgress,
    /// Completed query/mutate rounds
    pub iterations: u32,
    pub created_at: DateTime<Utc>,
}

impl BulkJob {
    pub fn new(label: impl Into<String>, query: QueryDocument, mutation: BulkMutation) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            query,
            mutation,
            state: JobState::Idle,
            progress: JobProgress::default(),
            iterations: 0,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle notifications published by the runner
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started { id: JobId, label: String },
    Progress { id: JobId, progress: JobProgress },
    Done { id: JobId, progress: JobProgress },
    Failed { id: JobId, progress: JobProgress, error: String },
    /// The last active job finished; the visible results are stale
    AllDone,
}

/// Final state of a job after the runner let go of it
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub label: String,
    pub state: JobState,
    pub progress: JobProgress,
    pub iterations: u32,
    #[serde(serialize_with = "error_message")]
    pub error: Option<JobError>,
}

fn error_message<S: Serializer>(error: &Option<JobError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

impl JobReport {
    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }
}

impl From<&BulkJob> for JobReport {
    fn from(job: &BulkJob) -> Self {
        Self {
            id: job.id,
            label: job.label.clone(),
            state: job.state,
            progress: job.progress,
            iterations: job.iterations,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{BulkItem, ItemOutcome, QueryKind};
    use serde_json::json;

    #[test]
    fn test_progress_counts_attempts() {
        let mut progress = JobProgress {
            total: Some(4),
            ..Default::default()
        };
        progress.record(&BulkResponse {
            took: 1,
            errors: true,
            items: vec![
                BulkItem::Update(ItemOutcome::ok("a")),
                BulkItem::Update(ItemOutcome::with_status("b", 500)),
                BulkItem::Update(ItemOutcome::ok("c")),
            ],
        });

        assert_eq!(progress.processed, 3);
        assert_eq!(progress.succeeded, 2);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.fraction(), Some(0.75));
    }

    #[test]
    fn test_fraction_unknown_total() {
        assert_eq!(JobProgress::default().fraction(), None);
        let empty = JobProgress {
            total: Some(0),
            ..Default::default()
        };
        assert_eq!(empty.fraction(), Some(1.0));
    }

    #[test]
    fn test_new_job_is_idle() {
        let job = BulkJob::new(
            "archive",
            QueryDocument::new(QueryKind::Hits, json!({"query": {"match_all": {}}})),
            BulkMutation::remove_tag("inbox"),
        );
        assert_eq!(job.state, JobState::Idle);
        assert!(!job.state.is_finished());
        assert_eq!(JobReport::from(&job).progress, JobProgress::default());
    }

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::AllDone;
        assert_eq!(serde_json::to_value(&event).unwrap(), json!({"event": "all_done"}));
    }
}
