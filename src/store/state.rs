use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fallback::DataSource;
use crate::records::{Recency, Record, RecordId};

/// In-memory state of a [`DomainStore`](super::DomainStore).
///
/// Holds at most one record per id. Every mutation goes through the
/// methods here so the store can apply each reconciliation step as a single
/// write.
#[derive(Debug, Clone, Serialize)]
pub struct StoreState<R> {
    records: Vec<R>,
    in_flight: u32,
    error: Option<String>,
    last_fetched: Option<DateTime<Utc>>,
    owner_id: Option<String>,
    source: DataSource,
    /// Records mirror a whole primary load rather than a subset of it.
    complete: bool,
}

impl<R> Default for StoreState<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            in_flight: 0,
            error: None,
            last_fetched: None,
            owner_id: None,
            source: DataSource::Primary,
            complete: false,
        }
    }
}

impl<R: Record> StoreState<R> {
    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.last_fetched
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    pub fn is_using_fallback(&self) -> bool {
        self.source == DataSource::Fallback
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.id().is_pending()).count()
    }

    pub(crate) fn begin(&mut self) {
        self.in_flight += 1;
    }

    pub(crate) fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub(crate) fn set_last_fetched(&mut self, at: Option<DateTime<Utc>>) {
        self.last_fetched = at;
    }

    pub(crate) fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Swap in a whole collection for an owner, dropping duplicate ids.
    pub(crate) fn replace_all(&mut self, owner_id: &str, records: Vec<R>, source: DataSource) {
        let mut seen = HashSet::with_capacity(records.len());
        self.records = records
            .into_iter()
            .filter(|r| seen.insert(r.id().clone()))
            .collect();
        self.owner_id = Some(owner_id.to_string());
        self.source = source;
        self.complete = source == DataSource::Primary;
    }

    /// Leave fallback mode on a confirmed add.
    ///
    /// Demo records are dropped while other optimistic entries stay in
    /// flight. What remains is only part of the owner's rows, so it is
    /// neither fresh nor complete until the next successful fetch.
    pub(crate) fn promote(&mut self, pending: &RecordId, confirmed: R) {
        self.records.retain(|r| r.id().is_pending());
        if self.position(pending).is_some() {
            self.confirm(pending, confirmed);
        } else {
            self.upsert(confirmed);
        }
        self.source = DataSource::Primary;
        self.complete = false;
        self.last_fetched = None;
    }

    /// Insert where a new record belongs for this store's ordering.
    pub(crate) fn insert_by_recency(&mut self, record: R) {
        match R::ORDER {
            Recency::NewestFirst => self.records.insert(0, record),
            Recency::OldestFirst => self.records.push(record),
        }
    }

    /// Replace the record with the same id, or insert it.
    pub(crate) fn upsert(&mut self, record: R) {
        match self.position(record.id()) {
            Some(pos) => self.records[pos] = record,
            None => self.insert_by_recency(record),
        }
    }

    /// Replace an existing record in place; absent ids are left alone.
    pub(crate) fn merge(&mut self, record: R) -> bool {
        match self.position(record.id()) {
            Some(pos) => {
                self.records[pos] = record;
                true
            }
            None => false,
        }
    }

    /// Swap a pending entry for its confirmed record.
    ///
    /// Returns false when the pending entry is no longer held. If another
    /// entry already carries the confirmed id, the pending entry is dropped
    /// instead so ids stay unique.
    pub(crate) fn confirm(&mut self, pending: &RecordId, confirmed: R) -> bool {
        let Some(pos) = self.position(pending) else {
            return false;
        };
        match self.position(confirmed.id()) {
            Some(existing) => {
                self.records[existing] = confirmed;
                self.records.remove(pos);
            }
            None => self.records[pos] = confirmed,
        }
        true
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> Option<R> {
        self.position(id).map(|pos| self.records.remove(pos))
    }

    /// Drop everything except the in-flight counter.
    pub(crate) fn clear(&mut self) {
        let in_flight = self.in_flight;
        *self = Self::default();
        self.in_flight = in_flight;
    }

    /// Confirmed records, the subset worth persisting.
    pub(crate) fn confirmed_records(&self) -> Vec<R> {
        self.records
            .iter()
            .filter(|r| !r.id().is_pending())
            .cloned()
            .collect()
    }
}
