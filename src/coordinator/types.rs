//! Public types for the search sync coordinator.

use serde::Serialize;

use crate::entity::Entity;
use crate::storage::traits::StoredDocument;

/// Coordinator lifecycle state.
///
/// Use [`super::SearchSync::state()`] to check the current state or
/// [`super::SearchSync::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Just created, backend not probed yet
    Created,
    /// Connectivity probe in flight
    Connecting,
    /// Backend answered the probe
    Ready,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// What [`super::SearchSync::ensure_index()`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsureOutcome {
    /// Index was already there
    Existing,
    /// Index was created
    Created,
    /// Index existed and its analyzers were re-applied
    Reconciled,
}

impl std::fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Existing => write!(f, "existing"),
            Self::Created => write!(f, "created"),
            Self::Reconciled => write!(f, "reconciled"),
        }
    }
}

/// The index side effect of an entity save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexWrite {
    /// First insert of a new entity
    Created,
    /// Merge-or-create of an entity that already had an id
    Upserted,
    /// A save filter kept the entity out of the index
    Skipped,
}

/// Result of an entity save. `entity` is the system of record's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub entity: Entity,
    pub index: String,
    pub write: IndexWrite,
}

/// Result of a remove. Removing an absent document still succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
    pub id: String,
    /// Whether the index held a document under the id
    pub document_existed: bool,
}

/// Result of a document load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Found(StoredDocument),
    NotFound,
}

impl LoadResult {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn document(self) -> Option<StoredDocument> {
        match self {
            Self::Found(doc) => Some(doc),
            Self::NotFound => None,
        }
    }
}
