use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{RemoteCollection, SelectQuery};
use crate::error::{BackendError, BackendResult};

/// Kind of remote call, used for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    failing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
}

/// In-process implementation of [`RemoteCollection`].
///
/// Rows live in plain JSON tables. Any operation can be switched to fail,
/// and every call is counted, which makes it the primary used by tests and
/// the CLI demo mode.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend on which every operation fails
    pub fn unreachable() -> Self {
        let backend = Self::new();
        backend.fail_all();
        backend
    }

    /// Delay every call, so concurrent callers interleave
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the contents of a table
    pub fn seed(&self, collection: &str, rows: Vec<Value>) {
        self.lock().tables.insert(collection.to_string(), rows);
    }

    /// Current rows of a table
    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.lock()
            .tables
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    pub fn fail_all(&self) {
        self.lock().failing.extend(Operation::ALL);
    }

    pub fn recover(&self) {
        self.lock().failing.clear();
    }

    /// Number of calls made for an operation
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only follows a panic in a test thread; keep serving rows.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, op: Operation) -> BackendResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        if inner.failing.contains(&op) {
            return Err(BackendError::Unavailable {
                message: format!("{:?} rejected by memory backend", op),
                retries: 0,
            });
        }
        Ok(())
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn compare_column(a: &Value, b: &Value, column: &str) -> Ordering {
    let a = column_text(a, column);
    let b = column_text(b, column);
    match (a.as_deref(), b.as_deref()) {
        (Some(a), Some(b)) => match (
            DateTime::parse_from_rfc3339(a),
            DateTime::parse_from_rfc3339(b),
        ) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        },
        (a, b) => a.cmp(&b),
    }
}

#[async_trait]
impl RemoteCollection for MemoryBackend {
    async fn select(&self, query: &SelectQuery) -> BackendResult<Vec<Value>> {
        self.enter(Operation::Select).await?;

        let inner = self.lock();
        let mut rows: Vec<Value> = inner
            .tables
            .get(&query.collection)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        query.filters.iter().all(|(column, value)| {
                            column_text(row, column).as_deref() == Some(value.as_str())
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_column(a, b, &order.column);
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> BackendResult<Vec<Value>> {
        self.enter(Operation::Insert).await?;

        let now = Utc::now().to_rfc3339();
        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            let map = row
                .as_object_mut()
                .ok_or_else(|| BackendError::Api {
                    status: 400,
                    message: "Row must be a JSON object".to_string(),
                })?;
            map.entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            map.entry("created_at")
                .or_insert_with(|| Value::String(now.clone()));
            map.entry("updated_at")
                .or_insert_with(|| Value::String(now.clone()));
            stored.push(row);
        }

        self.lock()
            .tables
            .entry(collection.to_string())
            .or_default()
            .extend(stored.iter().cloned());

        Ok(stored)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> BackendResult<Vec<Value>> {
        self.enter(Operation::Update).await?;

        let mut inner = self.lock();
        let Some(row) = inner
            .tables
            .get_mut(collection)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| column_text(row, "id").as_deref() == Some(id))
            })
        else {
            return Ok(Vec::new());
        };

        if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                if key != "id" {
                    target.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(vec![row.clone()])
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<Vec<Value>> {
        self.enter(Operation::Delete).await?;

        let mut inner = self.lock();
        let Some(rows) = inner.tables.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let (removed, kept): (Vec<Value>, Vec<Value>) = rows
            .drain(..)
            .partition(|row| column_text(row, "id").as_deref() == Some(id));
        *rows = kept;

        Ok(removed)
    }
}
