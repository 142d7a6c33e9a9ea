//! Triage console orchestration
//!
//! [`TriageConsole`] is what a UI drives: it holds the current view and
//! search form, runs searches, and routes single-event, selection and
//! query-wide actions through the search client. Failures are published on
//! the [`Notifier`] and returned to the caller.

use crate::aggregation::{apply_severity, AggregationProjector, SeverityCache, SeverityResolved};
use crate::bulk::{BulkJob, BulkJobRunner, JobEvent, JobReport};
use crate::config::{BulkSettings, Config};
use crate::error::{AppError, Result};
use crate::models::{
    AggregationMode, AggregationRow, DocumentRef, SearchForm, View, INBOX_TAG, STARRED_TAG,
};
use crate::notifications::Notifier;
use crate::results::{LoadOutcome, ReconcileReport, ResultSetController};
use crate::search::{
    BulkMutation, DeleteByQueryResponse, FixedFilters, QueryBuilder, QueryKind, SearchClient,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument};
use validator::Validate;

const ARCHIVE_NOT_VALID: &str = "Archive not valid in this context";
const NO_EVENTS_SELECTED: &str = "No events selected.";
const NO_EVENTS_TO_ARCHIVE: &str = "No events to archive.";
const NO_EVENTS_TO_DELETE: &str = "No events to delete.";

/// What the last search put on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Events { page: u32, count: usize, total: u64 },
    Aggregations { rows: usize },
}

/// How a query-wide delete was carried out
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    /// One server-side delete-by-query call
    Server(DeleteByQueryResponse),
    /// Client-side paginated job
    Job(JobReport),
}

pub struct TriageConsole {
    client: Arc<dyn SearchClient>,
    builder: QueryBuilder,
    projector: AggregationProjector,
    severity_cache: SeverityCache,
    results: ResultSetController,
    runner: BulkJobRunner,
    notifier: Notifier,
    bulk: BulkSettings,
    inbox_aggregation: AggregationMode,
    view: View,
    fixed: FixedFilters,
    form: SearchForm,
    rows: Vec<AggregationRow>,
    pending_severities: Option<mpsc::UnboundedReceiver<SeverityResolved>>,
}

impl TriageConsole {
    /// Console for `view` with a fresh form and its own severity cache
    pub fn new(client: Arc<dyn SearchClient>, config: &Config, view: View) -> Self {
        let builder = QueryBuilder::new(&config.search);
        let fixed = FixedFilters::for_view(view, builder.fields());
        let form = SearchForm::new(config.search.page_size)
            .with_aggregation(config.search.initial_aggregation(view));

        Self {
            projector: AggregationProjector::new(Arc::clone(&client), builder.clone()),
            results: ResultSetController::new(
                config.search.timestamp_field.clone(),
                config.search.tags_field.clone(),
            ),
            runner: BulkJobRunner::new(Arc::clone(&client), &config.bulk),
            notifier: Notifier::new(config.bulk.event_capacity),
            severity_cache: SeverityCache::new(),
            bulk: config.bulk.clone(),
            inbox_aggregation: config.search.default_inbox_aggregation,
            client,
            builder,
            view,
            fixed,
            form,
            rows: Vec::new(),
            pending_severities: None,
        }
    }

    /// Share a severity cache with other consoles of the same session
    pub fn with_severity_cache(mut self, cache: SeverityCache) -> Self {
        self.severity_cache = cache;
        self
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn form(&self) -> &SearchForm {
        &self.form
    }

    pub fn results(&self) -> &ResultSetController {
        &self.results
    }

    /// Selection, expansion and cursor movement
    pub fn results_mut(&mut self) -> &mut ResultSetController {
        &mut self.results
    }

    pub fn rows(&self) -> &[AggregationRow] {
        &self.rows
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn severity_cache(&self) -> &SeverityCache {
        &self.severity_cache
    }

    pub fn subscribe_jobs(&self) -> broadcast::Receiver<JobEvent> {
        self.runner.subscribe()
    }

    /// Switch view. The form keeps its query, restarts at page 1 and takes
    /// the view's initial aggregation mode.
    pub fn set_view(&mut self, view: View) {
        self.view = view;
        self.fixed = FixedFilters::for_view(view, self.builder.fields());
        self.form.page = 1;
        self.form.aggregate_by = match view {
            View::Inbox => self.inbox_aggregation,
            _ => AggregationMode::None,
        };
    }

    /// Validate and run a new search
    pub async fn search(&mut self, form: SearchForm) -> Result<RefreshOutcome> {
        if let Err(e) = form.validate() {
            let err = AppError::from(e);
            self.notifier.warning(err.to_string());
            return Err(err);
        }
        self.form = form;
        self.refresh().await
    }

    pub async fn goto_page(&mut self, page: u32) -> Result<RefreshOutcome> {
        let form = self.form.clone().with_page(page);
        self.search(form).await
    }

    /// Re-run the current search.
    ///
    /// An empty page past page 1 steps back one page at a time until a page
    /// has results or page 1 is reached.
    #[instrument(skip(self), fields(view = %self.view, page = self.form.page))]
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        let result = self.refresh_inner().await;
        if let Err(e) = &result {
            self.notifier.error(e, self.client.endpoint());
        }
        result
    }

    async fn refresh_inner(&mut self) -> Result<RefreshOutcome> {
        loop {
            let query = self.builder.build(&self.form, &self.fixed);

            match query.kind() {
                QueryKind::Hits => {
                    let hits = self.client.search_hits(&query).await?;
                    self.rows.clear();
                    self.pending_severities = None;

                    match self.results.load(hits, self.form.page) {
                        LoadOutcome::RetryWithPreviousPage { page } => {
                            self.form.page = page;
                        }
                        LoadOutcome::Loaded { count, total } => {
                            debug!(count, total, "Loaded result page");
                            return Ok(RefreshOutcome::Events {
                                page: self.form.page,
                                count,
                                total,
                            });
                        }
                    }
                }
                QueryKind::Aggregations(mode) => {
                    let response = self.client.search_aggregations(&query).await?;
                    self.results.clear();
                    self.rows = self.projector.project(
                        &response,
                        mode,
                        self.form.sort_by,
                        self.form.sort_order,
                    );
                    self.pending_severities = Some(
                        self.projector
                            .resolve_severities(&self.rows, &self.severity_cache),
                    );
                    debug!(rows = self.rows.len(), mode = %mode, "Loaded aggregation");
                    return Ok(RefreshOutcome::Aggregations {
                        rows: self.rows.len(),
                    });
                }
            }
        }
    }

    /// Patch rows with every severity resolved so far; returns how many
    pub fn apply_resolved_severities(&mut self) -> usize {
        let Some(pending) = self.pending_severities.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        loop {
            match pending.try_recv() {
                Ok(update) => {
                    if apply_severity(&mut self.rows, update) {
                        applied += 1;
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.pending_severities = None;
                    break;
                }
            }
        }
        applied
    }

    /// Wait for every outstanding severity lookup and apply the results
    pub async fn await_severities(&mut self) -> usize {
        let Some(mut pending) = self.pending_severities.take() else {
            return 0;
        };

        let mut applied = 0;
        while let Some(update) = pending.recv().await {
            if apply_severity(&mut self.rows, update) {
                applied += 1;
            }
        }
        applied
    }

    /// Remove the `inbox` tag from one event
    pub async fn archive_event(&mut self, id: &str) -> Result<ReconcileReport> {
        self.mutate_events(vec![self.target(id)?], BulkMutation::remove_tag(INBOX_TAG))
            .await
    }

    /// Permanently delete one event
    pub async fn delete_event(&mut self, id: &str) -> Result<ReconcileReport> {
        self.mutate_events(vec![self.target(id)?], BulkMutation::Delete)
            .await
    }

    /// Add or remove the `starred` tag; returns whether the event is now starred
    pub async fn toggle_star(&mut self, id: &str) -> Result<bool> {
        let tags_field = self.builder.fields().tags.clone();
        let target = self.target(id)?;
        let starred = self
            .results
            .get(id)
            .map(|record| record.has_tag(&tags_field, STARRED_TAG))
            .unwrap_or(false);

        let mutation = if starred {
            BulkMutation::remove_tag(STARRED_TAG)
        } else {
            BulkMutation::add_tag(STARRED_TAG)
        };

        let response = match self.client.bulk_mutate(&[target], &mutation).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e.into())),
        };

        if response.succeeded() == 1 {
            if let Some(record) = self.results.get_mut(id) {
                record.set_tag(&tags_field, STARRED_TAG, !starred);
            }
            Ok(!starred)
        } else {
            let status = response.items.first().map(|item| item.outcome().status).unwrap_or(0);
            error!(document_id = %id, status, "Failed to toggle star");
            Ok(starred)
        }
    }

    /// Archive every selected event; only meaningful on the inbox view
    pub async fn archive_selected(&mut self) -> Result<ReconcileReport> {
        if self.view != View::Inbox {
            return Err(self.reject(ARCHIVE_NOT_VALID));
        }
        let targets = self.results.selected_refs();
        if targets.is_empty() {
            return Err(self.reject(NO_EVENTS_SELECTED));
        }
        self.mutate_events(targets, BulkMutation::remove_tag(INBOX_TAG))
            .await
    }

    pub async fn delete_selected(&mut self) -> Result<ReconcileReport> {
        let targets = self.results.selected_refs();
        if targets.is_empty() {
            return Err(self.reject(NO_EVENTS_SELECTED));
        }
        self.mutate_events(targets, BulkMutation::Delete).await
    }

    /// Archive everything the current search matches in the inbox, up to
    /// the newest event on screen.
    pub async fn archive_by_query(&mut self) -> Result<JobReport> {
        let newest = self.query_bound(NO_EVENTS_TO_ARCHIVE)?;
        let query = self
            .builder
            .archive_by_query(&self.form, &newest, self.bulk.batch_size);
        let job = BulkJob::new("Archiving...", query, BulkMutation::remove_tag(INBOX_TAG));

        self.run_job(job).await
    }

    /// Delete everything the current search matches, up to the newest event
    /// on screen.
    pub async fn delete_by_query(&mut self) -> Result<DeleteOutcome> {
        let newest = self.query_bound(NO_EVENTS_TO_DELETE)?;
        let query = self.builder.delete_by_query(&self.form, &self.fixed, &newest);

        if self.bulk.server_delete_by_query {
            let response = match self.client.delete_by_query(&query).await {
                Ok(response) => response,
                Err(e) => return Err(self.fail(e.into())),
            };
            info!(deleted = response.deleted, "Deleted by query");
            self.restart().await?;
            return Ok(DeleteOutcome::Server(response));
        }

        let query = query.paged(self.bulk.batch_size, &self.builder.fields().timestamp);
        let job = BulkJob::new("Deleting...", query, BulkMutation::Delete);
        self.run_job(job).await.map(DeleteOutcome::Job)
    }

    async fn run_job(&mut self, job: BulkJob) -> Result<JobReport> {
        let report = self.runner.run_one(job).await;

        if self.runner.is_idle() {
            self.restart().await?;
        }

        match &report.error {
            Some(e) => Err(self.fail(e.clone().into())),
            None => Ok(report),
        }
    }

    /// Send one mutation for `targets`, drop the ones that succeeded, and
    /// refresh once the page is empty.
    async fn mutate_events(
        &mut self,
        targets: Vec<DocumentRef>,
        mutation: BulkMutation,
    ) -> Result<ReconcileReport> {
        let response = match self.client.bulk_mutate(&targets, &mutation).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e.into())),
        };

        let report = self.results.reconcile_bulk_result(&targets, &response.items);
        info!(
            mutation = %mutation,
            removed = report.removed,
            failed = report.failures.len(),
            "Applied mutation to events"
        );

        if self.results.is_empty() {
            self.refresh().await?;
        }
        Ok(report)
    }

    /// Newest timestamp on screen, or a warning when nothing matches
    fn query_bound(&self, empty_message: &str) -> Result<Value> {
        if self.results.total() == 0 {
            return Err(self.reject(empty_message));
        }
        self.results
            .newest_timestamp()
            .ok_or_else(|| self.reject(empty_message))
    }

    fn target(&self, id: &str) -> Result<DocumentRef> {
        self.results
            .get(id)
            .map(|record| record.doc.clone())
            .ok_or_else(|| self.reject(&format!("Event {} is not on the current page", id)))
    }

    async fn restart(&mut self) -> Result<RefreshOutcome> {
        self.form.page = 1;
        self.refresh().await
    }

    /// Warn and abort before any request is sent
    fn reject(&self, message: &str) -> AppError {
        self.notifier.warning(message);
        AppError::Validation(message.to_string())
    }

    fn fail(&self, err: AppError) -> AppError {
        self.notifier.error(&err, self.client.endpoint());
        err
    }
}
