//! Current page of matched events

use crate::models::{DocumentRef, EventRecord};
use crate::search::{BulkItem, HitListResponse};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Ordered page of records with a total-match count and an active cursor.
///
/// The cursor is `None` exactly when the page is empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    pub records: Vec<EventRecord>,
    pub total: u64,
    pub active: Option<usize>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What the caller should do after a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { count: usize, total: u64 },
    /// The page came back empty past page 1; search `page` instead
    RetryWithPreviousPage { page: u32 },
}

/// A bulk item the server refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub document_id: String,
    pub status: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub removed: usize,
    pub failures: Vec<ItemFailure>,
}

impl ReconcileReport {
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Owns the current [`ResultSet`] and every mutation of it
#[derive(Debug, Clone)]
pub struct ResultSetController {
    set: ResultSet,
    timestamp_field: String,
    tags_field: String,
}

impl ResultSetController {
    pub fn new(timestamp_field: impl Into<String>, tags_field: impl Into<String>) -> Self {
        Self {
            set: ResultSet::default(),
            timestamp_field: timestamp_field.into(),
            tags_field: tags_field.into(),
        }
    }

    /// Replace the set with a fresh search response for `page`.
    pub fn load(&mut self, response: HitListResponse, page: u32) -> LoadOutcome {
        let total = response.total();
        let records: Vec<EventRecord> = response
            .hits
            .hits
            .into_iter()
            .map(|hit| hit.into_record(&self.timestamp_field, &self.tags_field))
            .collect();

        let count = records.len();
        self.set = ResultSet {
            active: if records.is_empty() { None } else { Some(0) },
            records,
            total,
        };

        if count == 0 && page > 1 {
            debug!(page, "Empty page, stepping back");
            return LoadOutcome::RetryWithPreviousPage { page: page - 1 };
        }

        LoadOutcome::Loaded { count, total }
    }

    pub fn clear(&mut self) {
        self.set = ResultSet::default();
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.set
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.set.records
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.set.total
    }

    pub fn active_index(&self) -> Option<usize> {
        self.set.active
    }

    pub fn active(&self) -> Option<&EventRecord> {
        self.set.active.and_then(|index| self.set.records.get(index))
    }

    pub fn get(&self, id: &str) -> Option<&EventRecord> {
        self.set.records.iter().find(|record| record.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut EventRecord> {
        self.set.records.iter_mut().find(|record| record.id() == id)
    }

    /// Remove one record, keeping the cursor on the record it pointed at.
    ///
    /// When the active record itself is removed the cursor stays at the same
    /// index, clamped to the new length.
    pub fn remove(&mut self, id: &str) -> Option<EventRecord> {
        let position = self.set.records.iter().position(|record| record.id() == id)?;
        let removed = self.set.records.remove(position);
        let len = self.set.records.len();

        self.set.active = match self.set.active {
            _ if len == 0 => None,
            Some(active) if position < active => Some(active - 1),
            Some(active) => Some(active.min(len - 1)),
            None => Some(0),
        };
        self.set.total = self.set.total.saturating_sub(1);

        Some(removed)
    }

    /// Drop every target the bulk response reports as successful.
    ///
    /// `outcomes` is parallel to `targets`. Failed items stay visible and are
    /// logged; a target without an outcome is treated as failed.
    pub fn reconcile_bulk_result(
        &mut self,
        targets: &[DocumentRef],
        outcomes: &[BulkItem],
    ) -> ReconcileReport {
        if outcomes.len() != targets.len() {
            warn!(
                targets = targets.len(),
                outcomes = outcomes.len(),
                "Bulk response item count does not match request"
            );
        }

        let mut report = ReconcileReport::default();
        for (index, target) in targets.iter().enumerate() {
            match outcomes.get(index).map(BulkItem::outcome) {
                Some(outcome) if outcome.is_success() => {
                    if self.remove(&target.id).is_some() {
                        report.removed += 1;
                    }
                }
                Some(outcome) => {
                    error!(
                        document_id = %target.id,
                        status = outcome.status,
                        error = ?outcome.error,
                        "Bulk mutation failed for document"
                    );
                    report.failures.push(ItemFailure {
                        document_id: target.id.clone(),
                        status: outcome.status,
                    });
                }
                None => {
                    error!(document_id = %target.id, "No bulk outcome for document");
                    report.failures.push(ItemFailure {
                        document_id: target.id.clone(),
                        status: 0,
                    });
                }
            }
        }

        report
    }

    pub fn select_all(&mut self) {
        self.set.records.iter_mut().for_each(|record| record.selected = true);
    }

    pub fn deselect_all(&mut self) {
        self.set.records.iter_mut().for_each(|record| record.selected = false);
    }

    /// Toggle one record's detail view; at most one record is expanded.
    pub fn toggle_expand(&mut self, id: &str) -> bool {
        let mut expanded = false;
        for record in &mut self.set.records {
            if record.id() == id {
                record.expanded = !record.expanded;
                expanded = record.expanded;
            } else {
                record.expanded = false;
            }
        }
        expanded
    }

    pub fn selected_refs(&self) -> Vec<DocumentRef> {
        self.set
            .records
            .iter()
            .filter(|record| record.selected)
            .map(|record| record.doc.clone())
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.set.records.iter().filter(|record| record.selected).count()
    }

    /// Raw timestamp of the newest record on the page, used as the upper
    /// bound of query-wide bulk actions.
    pub fn newest_timestamp(&self) -> Option<Value> {
        let newest = self
            .set
            .records
            .iter()
            .filter(|record| record.timestamp.is_some())
            .max_by_key(|record| record.timestamp)
            .or_else(|| self.set.records.first())?;

        newest.raw_timestamp(&self.timestamp_field).cloned()
    }

    pub fn move_next(&mut self) -> Option<usize> {
        let len = self.set.len();
        self.set.active = self.set.active.map(|active| (active + 1).min(len - 1));
        self.set.active
    }

    pub fn move_prev(&mut self) -> Option<usize> {
        self.set.active = self.set.active.map(|active| active.saturating_sub(1));
        self.set.active
    }

    pub fn move_first(&mut self) -> Option<usize> {
        if !self.set.is_empty() {
            self.set.active = Some(0);
        }
        self.set.active
    }

    pub fn move_last(&mut self) -> Option<usize> {
        if !self.set.is_empty() {
            self.set.active = Some(self.set.len() - 1);
        }
        self.set.active
    }

    /// Flip the selected flag of the active record
    pub fn toggle_selected_active(&mut self) -> Option<bool> {
        let index = self.set.active?;
        let record = self.set.records.get_mut(index)?;
        record.selected = !record.selected;
        Some(record.selected)
    }

    pub fn toggle_selected_and_next(&mut self) -> Option<usize> {
        self.toggle_selected_active()?;
        self.move_next()
    }

    pub fn toggle_selected_and_prev(&mut self) -> Option<usize> {
        self.toggle_selected_active()?;
        self.move_prev()
    }
}
