//! Domain records held by the stores.
//!
//! Every record carries a [`RecordId`] that is either a server-assigned id or
//! a client-side pending id created for an optimistic insert. The two id
//! spaces are separate variants, so a pending id can never be mistaken for a
//! confirmed one.

mod mood;
mod therapy;

pub use mood::{MoodDraft, MoodEntry, MoodSummary};
pub use therapy::{GoalDraft, GoalStatus, SessionDraft, TherapyGoal, TherapySession};

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Client-generated id for a record that has not been confirmed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(Uuid);

impl PendingId {
    /// Generate a fresh pending id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PendingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PendingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pending:{}", self.0)
    }
}

/// Identity of a record in a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RecordIdRepr", into = "RecordIdRepr")]
pub enum RecordId {
    /// Inserted locally, waiting for the server to assign an id.
    Pending(PendingId),
    /// Assigned by the server.
    Confirmed(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RecordIdRepr {
    Confirmed(String),
    Pending { pending: PendingId },
}

impl From<RecordIdRepr> for RecordId {
    fn from(repr: RecordIdRepr) -> Self {
        match repr {
            RecordIdRepr::Confirmed(id) => RecordId::Confirmed(id),
            RecordIdRepr::Pending { pending } => RecordId::Pending(pending),
        }
    }
}

impl From<RecordId> for RecordIdRepr {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Confirmed(id) => RecordIdRepr::Confirmed(id),
            RecordId::Pending(pending) => RecordIdRepr::Pending { pending },
        }
    }
}

impl RecordId {
    /// Wrap a server-assigned id
    pub fn confirmed(id: impl Into<String>) -> Self {
        RecordId::Confirmed(id.into())
    }

    /// The server id, if this record has been confirmed
    pub fn as_confirmed(&self) -> Option<&str> {
        match self {
            RecordId::Confirmed(id) => Some(id),
            RecordId::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RecordId::Pending(_))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Confirmed(id) => write!(f, "{}", id),
            RecordId::Pending(pending) => write!(f, "{}", pending),
        }
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Confirmed(id.to_string())
    }
}

/// Order in which a store keeps its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    NewestFirst,
    OldestFirst,
}

impl Recency {
    pub fn is_descending(self) -> bool {
        matches!(self, Recency::NewestFirst)
    }
}

/// A domain entity kept in a remote collection and mirrored in a store.
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Insert payload: the record minus server-assigned fields.
    type Draft: Clone + Debug + Serialize + Send + Sync + 'static;

    /// Remote table name.
    const COLLECTION: &'static str;
    /// Column holding the owner reference.
    const OWNER_COLUMN: &'static str = "user_id";
    /// Column the collection is ordered by.
    const ORDER_COLUMN: &'static str = "created_at";
    const ORDER: Recency = Recency::NewestFirst;
    /// Human-readable plural used in notifications.
    const LABEL: &'static str;

    fn id(&self) -> &RecordId;
    fn owner_id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;

    /// Owner of a draft, empty when nobody is signed in.
    fn draft_owner(draft: &Self::Draft) -> &str;

    /// Build a full record from a draft, stamped with `now`.
    fn materialize(id: RecordId, draft: &Self::Draft, now: DateTime<Utc>) -> Self;

    /// Check a draft before anything is sent to the server.
    fn validate(_draft: &Self::Draft) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Row payload for an update: every column except the id.
    fn to_row(&self) -> serde_json::Value {
        let mut row = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = row.as_object_mut() {
            map.remove("id");
        }
        row
    }
}
