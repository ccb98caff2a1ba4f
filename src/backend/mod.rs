//! Remote collection access.
//!
//! [`RemoteCollection`] is the tabular CRUD contract the stores talk to,
//! [`run_query`] is the wrapper that turns every remote call into a
//! [`QueryOutcome`] instead of an error or a panic.

mod client;
mod memory;

pub use client::{Credentials, RestBackend};
pub use memory::{MemoryBackend, Operation};

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::BackendResult;

/// Ordering clause for a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// A select with equality filters, optional ordering and limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub collection: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Add an equality filter
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Generic tabular CRUD surface of the hosted backend.
///
/// Every method returns the affected rows as JSON objects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Select rows matching the query.
    async fn select(&self, query: &SelectQuery) -> BackendResult<Vec<Value>>;
    /// Insert one or more rows, returning them as stored.
    async fn insert(&self, collection: &str, rows: Vec<Value>) -> BackendResult<Vec<Value>>;
    /// Patch the row with the given id.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> BackendResult<Vec<Value>>;
    /// Delete the row with the given id.
    async fn delete(&self, collection: &str, id: &str) -> BackendResult<Vec<Value>>;
}

/// Uniform `{data, error}` result of a remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> QueryOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.data, self.error) {
            (_, Some(message)) => Err(message),
            (Some(data), None) => Ok(data),
            (None, None) => Err("Query returned no data".to_string()),
        }
    }
}

/// Execute one remote operation and normalize its result.
///
/// Backend errors and panics raised while building or awaiting the
/// operation both land in [`QueryOutcome::error`].
pub async fn run_query<T, F, Fut>(operation: F) -> QueryOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    match AssertUnwindSafe(async move { operation().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(data)) => QueryOutcome::ok(data),
        Ok(Err(e)) => {
            warn!(error = %e, "Remote query failed");
            QueryOutcome::err(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(panic = %message, "Remote query panicked");
            QueryOutcome::err(format!("Unexpected error: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
