//! Domain stores: per-entity caches with optimistic updates and fallback.
//!
//! A [`DomainStore`] mirrors one remote collection for the signed-in owner.
//! Every action resolves normally; failures are reported through the
//! returned outcome, the store's error slot and a [`Notification`].
//!
//! In-flight requests are never cancelled. A response that arrives after
//! [`DomainStore::reset`] still settles the loading counter, but a confirmed
//! add is only applied while its pending entry or its owner is still held.

mod clock;
mod notify;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{Notification, Notifier, Severity};
pub use state::StoreState;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{run_query, RemoteCollection, SelectQuery};
use crate::error::{BackendError, BackendResult};
use crate::fallback::{DataSource, FallbackSupplier};
use crate::persist::{Snapshot, SnapshotPersistence};
use crate::records::{PendingId, Record, RecordId};

/// Result of a mutating store action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome<T> {
    /// The backend confirmed the change.
    Done(T),
    /// Validation or the remote call failed; local state was not changed.
    Failed(String),
    /// Nobody is signed in, nothing was attempted.
    Skipped,
}

impl<T> ActionOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, ActionOutcome::Done(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ActionOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            ActionOutcome::Done(value) => Some(value),
            _ => None,
        }
    }
}

/// What a fetch left in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchReport<R> {
    pub records: Vec<R>,
    pub source: DataSource,
    /// Served from memory without a remote call.
    pub from_cache: bool,
    pub error: Option<String>,
}

impl<R> FetchReport<R> {
    fn signed_out() -> Self {
        Self {
            records: Vec::new(),
            source: DataSource::Primary,
            from_cache: false,
            error: None,
        }
    }

    pub fn is_using_fallback(&self) -> bool {
        self.source == DataSource::Fallback
    }
}

fn decode_row<R: Record>(row: Value) -> BackendResult<R> {
    serde_json::from_value(row).map_err(|e| BackendError::InvalidResponse {
        message: format!("Malformed {} row: {}", R::COLLECTION, e),
    })
}

fn decode_rows<R: Record>(rows: Vec<Value>) -> BackendResult<Vec<R>> {
    rows.into_iter().map(decode_row).collect()
}

/// Cache and action set for one record type.
pub struct DomainStore<R: Record> {
    backend: Arc<dyn RemoteCollection>,
    fallback: Arc<dyn FallbackSupplier<R>>,
    persistence: Option<SnapshotPersistence>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    state: Arc<RwLock<StoreState<R>>>,
}

impl<R: Record> Clone for DomainStore<R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            fallback: Arc::clone(&self.fallback),
            persistence: self.persistence.clone(),
            notifier: self.notifier.clone(),
            clock: Arc::clone(&self.clock),
            freshness: self.freshness,
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Record> DomainStore<R> {
    /// Create an empty store over a backend and a fallback supplier
    pub fn new(
        backend: Arc<dyn RemoteCollection>,
        fallback: Arc<dyn FallbackSupplier<R>>,
    ) -> Self {
        Self {
            backend,
            fallback,
            persistence: None,
            notifier: Notifier::default(),
            clock: Arc::new(SystemClock),
            freshness: Duration::from_secs(5 * 60),
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_persistence(mut self, persistence: SnapshotPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Copy of the current state
    pub async fn state(&self) -> StoreState<R> {
        self.state.read().await.clone()
    }

    pub async fn records(&self) -> Vec<R> {
        self.state.read().await.records().to_vec()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading()
    }

    pub async fn is_using_fallback(&self) -> bool {
        self.state.read().await.is_using_fallback()
    }

    /// Load the owner's records, falling back to demo data on failure.
    ///
    /// A missing or empty owner clears the store without a remote call.
    pub async fn fetch(&self, owner: Option<&str>) -> FetchReport<R> {
        let Some(owner) = owner.filter(|o| !o.trim().is_empty()) else {
            self.state.write().await.clear();
            debug!(collection = R::COLLECTION, "No owner, store cleared");
            return FetchReport::signed_out();
        };

        self.state.write().await.begin();

        let backend = Arc::clone(&self.backend);
        let query = SelectQuery::new(R::COLLECTION)
            .eq(R::OWNER_COLUMN, owner)
            .order_by(R::ORDER_COLUMN, R::ORDER.is_descending());

        let outcome = run_query(|| async move {
            let rows = backend.select(&query).await?;
            decode_rows::<R>(rows)
        })
        .await;

        let now = self.clock.now();
        let report = match outcome.into_result() {
            Ok(records) => {
                let mut state = self.state.write().await;
                state.finish();
                state.replace_all(owner, records, DataSource::Primary);
                state.set_error(None);
                state.set_last_fetched(Some(now));

                info!(
                    collection = R::COLLECTION,
                    owner,
                    records = state.records().len(),
                    "Fetched records"
                );

                FetchReport {
                    records: state.records().to_vec(),
                    source: DataSource::Primary,
                    from_cache: false,
                    error: None,
                }
            }
            Err(message) => {
                let fallback = self.fallback.records(owner, now);
                let error = format!("Could not load your {}: {}", R::LABEL, message);

                let mut state = self.state.write().await;
                state.finish();
                state.replace_all(owner, fallback, DataSource::Fallback);
                state.set_error(Some(error.clone()));

                warn!(
                    collection = R::COLLECTION,
                    owner,
                    error = %message,
                    "Fetch failed, using fallback data"
                );
                self.notifier.error(
                    "Offline",
                    format!("Could not load your {}. Showing demo data.", R::LABEL),
                );

                FetchReport {
                    records: state.records().to_vec(),
                    source: DataSource::Fallback,
                    from_cache: false,
                    error: Some(error),
                }
            }
        };

        if report.source == DataSource::Primary {
            self.persist().await;
        }
        report
    }

    /// Return cached records while they are fresh, otherwise fetch.
    pub async fn fetch_if_stale(&self, owner: Option<&str>) -> FetchReport<R> {
        if let Some(owner) = owner.filter(|o| !o.trim().is_empty()) {
            let now = self.clock.now();
            let state = self.state.read().await;
            let fresh = state.owner_id() == Some(owner)
                && state.source() == DataSource::Primary
                && state
                    .last_fetched()
                    .and_then(|at| (now - at).to_std().ok())
                    .map(|age| age < self.freshness)
                    .unwrap_or(false);

            if fresh {
                debug!(collection = R::COLLECTION, owner, "Serving fresh cache");
                return FetchReport {
                    records: state.records().to_vec(),
                    source: DataSource::Primary,
                    from_cache: true,
                    error: None,
                };
            }
        }

        self.fetch(owner).await
    }

    /// Insert a record optimistically, then confirm it with the backend.
    pub async fn add(&self, draft: R::Draft) -> ActionOutcome<R> {
        if R::draft_owner(&draft).trim().is_empty() {
            debug!(collection = R::COLLECTION, "No owner, add skipped");
            return ActionOutcome::Skipped;
        }

        if let Err(e) = R::validate(&draft) {
            self.notifier.error("Check your entry", e.reason.clone());
            return ActionOutcome::Failed(e.to_string());
        }

        let pending = RecordId::Pending(PendingId::new());
        let optimistic = R::materialize(pending.clone(), &draft, self.clock.now());
        {
            let mut state = self.state.write().await;
            state.begin();
            state.insert_by_recency(optimistic);
        }

        let backend = Arc::clone(&self.backend);
        let outcome = run_query(|| async move {
            let payload = serde_json::to_value(&draft).map_err(|e| BackendError::InvalidRequest {
                message: e.to_string(),
            })?;
            let rows = backend.insert(R::COLLECTION, vec![payload]).await?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| BackendError::InvalidResponse {
                    message: "Insert returned no rows".to_string(),
                })?;
            decode_row::<R>(row)
        })
        .await;

        let result = match outcome.into_result() {
            Ok(confirmed) => {
                let mut state = self.state.write().await;
                state.finish();

                if state.is_using_fallback() && state.position(&pending).is_some() {
                    // The backend is reachable again; demo data must not mix with real rows.
                    state.promote(&pending, confirmed.clone());
                    state.set_error(None);
                } else if !state.confirm(&pending, confirmed.clone()) {
                    if state.source() == DataSource::Primary
                        && state.owner_id() == Some(confirmed.owner_id())
                    {
                        state.upsert(confirmed.clone());
                    } else {
                        debug!(
                            collection = R::COLLECTION,
                            id = %confirmed.id(),
                            "Pending entry gone, confirmed record not applied"
                        );
                    }
                }

                info!(collection = R::COLLECTION, id = %confirmed.id(), "Record added");
                ActionOutcome::Done(confirmed)
            }
            Err(message) => {
                let mut state = self.state.write().await;
                state.finish();
                state.remove(&pending);
                state.set_error(Some(message.clone()));

                warn!(collection = R::COLLECTION, error = %message, "Add failed, rolled back");
                self.notifier
                    .error("Could not save", format!("Saving to {} failed.", R::LABEL));
                ActionOutcome::Failed(message)
            }
        };

        if result.is_done() {
            self.persist().await;
        }
        result
    }

    /// Update a confirmed record remotely, then merge it locally.
    pub async fn update(&self, record: R) -> ActionOutcome<R> {
        let Some(id) = record.id().as_confirmed().map(str::to_string) else {
            let message = "Record is still being saved".to_string();
            self.notifier.error("Please wait", message.clone());
            return ActionOutcome::Failed(message);
        };

        self.state.write().await.begin();

        let backend = Arc::clone(&self.backend);
        let row = record.to_row();
        let outcome = run_query(|| async move {
            let rows = backend.update(R::COLLECTION, &id, row).await?;
            rows.into_iter().next().map(decode_row::<R>).transpose()
        })
        .await;

        let result = match outcome.into_result() {
            Ok(returned) => {
                let merged = returned.unwrap_or(record);
                let mut state = self.state.write().await;
                state.finish();
                if !state.merge(merged.clone()) {
                    debug!(
                        collection = R::COLLECTION,
                        id = %merged.id(),
                        "Updated record not held locally"
                    );
                }
                ActionOutcome::Done(merged)
            }
            Err(message) => {
                let mut state = self.state.write().await;
                state.finish();
                state.set_error(Some(message.clone()));

                warn!(collection = R::COLLECTION, error = %message, "Update failed");
                self.notifier
                    .error("Could not update", format!("Updating {} failed.", R::LABEL));
                ActionOutcome::Failed(message)
            }
        };

        if result.is_done() {
            self.persist().await;
        }
        result
    }

    /// Delete a confirmed record remotely, then drop it locally.
    ///
    /// Yields the locally removed record, if one was held.
    pub async fn delete(&self, id: &RecordId) -> ActionOutcome<Option<R>> {
        let Some(server_id) = id.as_confirmed().map(str::to_string) else {
            let message = "Record is still being saved".to_string();
            self.notifier.error("Please wait", message.clone());
            return ActionOutcome::Failed(message);
        };

        self.state.write().await.begin();

        let backend = Arc::clone(&self.backend);
        let outcome =
            run_query(|| async move { backend.delete(R::COLLECTION, &server_id).await }).await;

        let result = match outcome.into_result() {
            Ok(_) => {
                let mut state = self.state.write().await;
                state.finish();
                ActionOutcome::Done(state.remove(id))
            }
            Err(message) => {
                let mut state = self.state.write().await;
                state.finish();
                state.set_error(Some(message.clone()));

                warn!(collection = R::COLLECTION, error = %message, "Delete failed");
                self.notifier
                    .error("Could not delete", format!("Deleting from {} failed.", R::LABEL));
                ActionOutcome::Failed(message)
            }
        };

        if result.is_done() {
            self.persist().await;
        }
        result
    }

    /// Forget all records, e.g. on sign-out.
    pub async fn reset(&self) {
        self.state.write().await.clear();
        debug!(collection = R::COLLECTION, "Store reset");
    }

    /// Populate an empty store from the owner's persisted snapshot.
    ///
    /// Restored data is never considered fresh, so the next
    /// [`fetch_if_stale`](Self::fetch_if_stale) still goes to the backend.
    pub async fn restore(&self, owner: &str) -> bool {
        let Some(persistence) = &self.persistence else {
            return false;
        };

        let snapshot = match persistence.load::<R>().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return false,
            Err(e) => {
                warn!(collection = R::COLLECTION, error = %e, "Ignoring unreadable snapshot");
                return false;
            }
        };

        if snapshot.owner_id != owner {
            debug!(collection = R::COLLECTION, "Snapshot belongs to another owner");
            return false;
        }

        let mut state = self.state.write().await;
        if !state.records().is_empty() || state.last_fetched().is_some() {
            return false;
        }
        state.replace_all(owner, snapshot.records, DataSource::Primary);
        info!(
            collection = R::COLLECTION,
            owner,
            records = state.records().len(),
            "Restored snapshot"
        );
        true
    }

    /// Remove this store's persisted snapshot
    pub async fn clear_persisted(&self) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.clear(R::COLLECTION).await {
                warn!(collection = R::COLLECTION, error = %e, "Failed to clear snapshot");
            }
        }
    }

    /// Write confirmed primary records to the snapshot cache
    async fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let snapshot = {
            let state = self.state.read().await;
            match (state.owner_id(), state.source()) {
                (Some(owner), DataSource::Primary) if state.is_complete() => {
                    Snapshot::new(owner, state.last_fetched(), state.confirmed_records())
                }
                _ => return,
            }
        };

        if let Err(e) = persistence.save(&snapshot).await {
            warn!(collection = R::COLLECTION, error = %e, "Failed to persist snapshot");
        }
    }
}
