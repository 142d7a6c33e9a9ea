//! Query/mutate loop driving bulk jobs to completion

use crate::bulk::error::{JobError, JobResult};
use crate::bulk::job::{BulkJob, JobEvent, JobId, JobReport, JobState};
use crate::config::BulkSettings;
use crate::metrics::{BULK_ITEMS_TOTAL, BULK_JOBS_TOTAL};
use crate::models::DocumentRef;
use crate::search::{BulkResponse, RawHit, SearchClient};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Runs bulk jobs against a shared search client.
///
/// Each job's rounds are strictly sequential; separate jobs interleave
/// freely and share nothing but the client and the active-job set.
#[derive(Clone)]
pub struct BulkJobRunner {
    client: Arc<dyn SearchClient>,
    max_iterations: u32,
    events: broadcast::Sender<JobEvent>,
    active: Arc<Mutex<HashSet<JobId>>>,
}

impl BulkJobRunner {
    pub fn new(client: Arc<dyn SearchClient>, settings: &BulkSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity);
        Self {
            client,
            max_iterations: settings.max_iterations,
            events,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Number of jobs currently running
    pub fn active_jobs(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.lock().is_empty()
    }

    /// Run a batch of jobs concurrently and wait for all of them.
    ///
    /// Every job is registered before the first one starts, so
    /// [`JobEvent::AllDone`] is published once, after the last job finishes.
    pub async fn run(&self, jobs: Vec<BulkJob>) -> Vec<JobReport> {
        {
            let mut active = self.active.lock();
            active.extend(jobs.iter().map(|job| job.id));
        }

        join_all(jobs.into_iter().map(|job| self.drive(job))).await
    }

    /// Run a single job to completion
    pub async fn run_one(&self, job: BulkJob) -> JobReport {
        self.active.lock().insert(job.id);
        self.drive(job).await
    }

    async fn drive(&self, mut job: BulkJob) -> JobReport {
        info!(job_id = %job.id, label = %job.label, mutation = %job.mutation, "Starting bulk job");
        self.publish(JobEvent::Started {
            id: job.id,
            label: job.label.clone(),
        });

        let report = match self.iterate(&mut job).await {
            Ok(()) => {
                job.state = JobState::Done;
                BULK_JOBS_TOTAL.with_label_values(&["done"]).inc();
                info!(
                    job_id = %job.id,
                    processed = job.progress.processed,
                    failed = job.progress.failed,
                    iterations = job.iterations,
                    "Bulk job finished"
                );
                self.publish(JobEvent::Done {
                    id: job.id,
                    progress: job.progress,
                });
                JobReport::from(&job)
            }
            Err(e) => {
                job.state = JobState::Failed;
                BULK_JOBS_TOTAL.with_label_values(&["failed"]).inc();
                error!(
                    job_id = %job.id,
                    processed = job.progress.processed,
                    iterations = job.iterations,
                    error = %e,
                    "Bulk job failed"
                );
                self.publish(JobEvent::Failed {
                    id: job.id,
                    progress: job.progress,
                    error: e.to_string(),
                });
                let mut report = JobReport::from(&job);
                report.error = Some(e);
                report
            }
        };

        if self.finish(job.id) {
            debug!("All bulk jobs finished");
            self.publish(JobEvent::AllDone);
        }

        report
    }

    async fn iterate(&self, job: &mut BulkJob) -> JobResult<()> {
        loop {
            job.state = JobState::Querying;
            let hits = self.client.search_hits(&job.query).await?;

            if job.progress.total.is_none() {
                job.progress.total = Some(hits.total());
                self.publish(JobEvent::Progress {
                    id: job.id,
                    progress: job.progress,
                });
            }

            if hits.is_empty() {
                return Ok(());
            }

            if job.iterations >= self.max_iterations {
                return Err(JobError::IterationCapExceeded {
                    iterations: job.iterations,
                });
            }

            job.state = JobState::Mutating;
            let targets: Vec<DocumentRef> = hits.hits.hits.iter().map(RawHit::document_ref).collect();
            let response = self.client.bulk_mutate(&targets, &job.mutation).await?;
            job.iterations += 1;
            job.progress.record(&response);
            self.record_items(job, &targets, &response);

            self.publish(JobEvent::Progress {
                id: job.id,
                progress: job.progress,
            });

            // documents already gone no longer match, so the job still shrinks
            if !response.items.is_empty() && response.settled() == 0 {
                return Err(JobError::Stalled {
                    iteration: job.iterations,
                    failed: response.items.len() as u64,
                });
            }
        }
    }

    fn record_items(&self, job: &BulkJob, targets: &[DocumentRef], response: &BulkResponse) {
        let action = job.mutation.action();
        let succeeded = response.succeeded();
        let failed = response.items.len() - succeeded;

        BULK_ITEMS_TOTAL
            .with_label_values(&[action, "success"])
            .inc_by(succeeded as f64);
        BULK_ITEMS_TOTAL
            .with_label_values(&[action, "failure"])
            .inc_by(failed as f64);

        for (target, item) in targets.iter().zip(&response.items) {
            let outcome = item.outcome();
            if !outcome.is_success() {
                error!(
                    job_id = %job.id,
                    document_id = %target.id,
                    status = outcome.status,
                    "Bulk item failed"
                );
            }
        }

        debug!(
            job_id = %job.id,
            iteration = job.iterations,
            batch = targets.len(),
            processed = job.progress.processed,
            total = ?job.progress.total,
            "Bulk batch applied"
        );
    }

    /// Drop a job from the active set; true when it was the last one
    fn finish(&self, id: JobId) -> bool {
        let mut active = self.active.lock();
        active.remove(&id) && active.is_empty()
    }

    fn publish(&self, event: JobEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{
        BulkItem, BulkMutation, DeleteByQueryResponse, HitListResponse, ItemOutcome,
        QueryDocument, QueryKind, SearchResponse, SearchResult, TransportError,
    };
    use async_trait::async_trait;
    use serde_json::json;

    /// Always returns the same two hits and fails the mutation as configured
    struct StuckClient {
        status: u16,
    }

    #[async_trait]
    impl SearchClient for StuckClient {
        fn endpoint(&self) -> &str {
            "http://stuck"
        }

        async fn execute(&self, _query: &QueryDocument) -> SearchResult<SearchResponse> {
            Ok(SearchResponse::Hits(HitListResponse::new(
                2,
                vec![
                    RawHit::new("a", "idx", json!({})),
                    RawHit::new("b", "idx", json!({})),
                ],
            )))
        }

        async fn bulk_mutate(
            &self,
            targets: &[DocumentRef],
            _mutation: &BulkMutation,
        ) -> SearchResult<BulkResponse> {
            if self.status == 0 {
                return Err(TransportError::unreachable("connection refused").into());
            }
            Ok(BulkResponse {
                took: 1,
                errors: self.status >= 300,
                items: targets
                    .iter()
                    .map(|t| BulkItem::Update(ItemOutcome::with_status(t.id.clone(), self.status)))
                    .collect(),
            })
        }

        async fn delete_by_query(&self, _query: &QueryDocument) -> SearchResult<DeleteByQueryResponse> {
            Ok(DeleteByQueryResponse::default())
        }
    }

    fn settings() -> BulkSettings {
        BulkSettings {
            batch_size: 2,
            max_iterations: 3,
            server_delete_by_query: false,
            event_capacity: 64,
        }
    }

    fn job() -> BulkJob {
        BulkJob::new(
            "archive",
            QueryDocument::new(QueryKind::Hits, json!({"query": {"match_all": {}}})),
            BulkMutation::remove_tag("inbox"),
        )
    }

    #[tokio::test]
    async fn test_iteration_cap_stops_non_shrinking_job() {
        let runner = BulkJobRunner::new(Arc::new(StuckClient { status: 200 }), &settings());
        let report = runner.run_one(job()).await;

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.progress.processed, 6);
        assert!(matches!(
            report.error,
            Some(JobError::IterationCapExceeded { iterations: 3 })
        ));
        assert!(runner.is_idle());
    }

    #[tokio::test]
    async fn test_fully_failed_batch_stalls() {
        let runner = BulkJobRunner::new(Arc::new(StuckClient { status: 409 }), &settings());
        let report = runner.run_one(job()).await;

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.progress.failed, 2);
        assert!(matches!(report.error, Some(JobError::Stalled { .. })));
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal_and_publishes_all_done() {
        let runner = BulkJobRunner::new(Arc::new(StuckClient { status: 0 }), &settings());
        let mut events = runner.subscribe();
        let report = runner.run_one(job()).await;

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.progress.total, Some(2));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(JobEvent::Started { .. })));
        assert!(matches!(seen[seen.len() - 2], JobEvent::Failed { .. }));
        assert_eq!(seen.last(), Some(&JobEvent::AllDone));
    }
}
