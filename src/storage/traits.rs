// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collaborator capabilities and the shared error type.
//!
//! The sync layer owns no storage. It talks to two collaborators:
//! - [`SearchClient`]: the search engine (index lifecycle, documents, queries)
//! - [`SystemOfRecord`]: the authoritative entity store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::entity::{Entity, EntityCanon, TYPE_FIELD};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Cannot reach search backend: {0}")]
    Connectivity(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Not found: '{id}' in index '{index}'")]
    NotFound { index: String, id: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The system of record accepted the change but the index write failed.
    /// The system-of-record change is not rolled back.
    #[error("Search index diverged from system of record for {} '{}': {source}", .entity.type_name(), .entity.id().unwrap_or("-"))]
    PartialDivergence {
        entity: Box<Entity>,
        source: Box<SearchError>,
    },
    #[error("Backend error: {0}")]
    Backend(String),
}

impl SearchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SearchError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SearchError::Conflict(_))
    }

    pub(crate) fn not_found(index: &str, id: &str) -> Self {
        SearchError::NotFound {
            index: index.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn diverged(entity: Entity, source: SearchError) -> Self {
        SearchError::PartialDivergence {
            entity: Box::new(entity),
            source: Box::new(source),
        }
    }
}

/// How a document write treats an existing document with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Plain index-by-id: replaces whatever is stored under the id.
    Create,
    /// Merge into the stored document, creating it when missing.
    Upsert,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Create => write!(f, "create"),
            WriteMode::Upsert => write!(f, "upsert"),
        }
    }
}

/// A single document write.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    pub index: String,
    /// `None` lets the backend assign an id.
    pub id: Option<String>,
    pub body: Map<String, Value>,
    pub mode: WriteMode,
    /// Make the write visible to search before returning.
    pub refresh: bool,
}

/// Acknowledgment of a document write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    pub index: String,
    pub id: String,
    /// `true` when no document existed under the id before the write.
    pub created: bool,
}

/// A document as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub index: String,
    pub id: String,
    pub source: Map<String, Value>,
}

impl StoredDocument {
    /// Value of the type discriminator, if the document carries one.
    pub fn doc_type(&self) -> Option<&str> {
        self.source.get(TYPE_FIELD).and_then(Value::as_str)
    }
}

/// One search result. The body may be stale until rehydrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: String,
    pub id: String,
    #[serde(default)]
    pub score: Option<f64>,
    pub source: Map<String, Value>,
}

impl SearchHit {
    pub fn doc_type(&self) -> Option<&str> {
        self.source.get(TYPE_FIELD).and_then(Value::as_str)
    }
}

/// Hits plus the total number of matching documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// Search engine capability.
///
/// Implementations report an absent document or index as [`SearchError::NotFound`]
/// and an already-existing index as [`SearchError::Conflict`]; the coordinator
/// decides which of those are errors for the caller.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> Result<(), SearchError>;

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;
    /// Create an index from a `{ settings, mappings }` body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError>;
    async fn delete_index(&self, index: &str) -> Result<(), SearchError>;

    /// Mapping `properties` object of the index.
    async fn get_mapping(&self, index: &str) -> Result<Value, SearchError>;
    /// Add mapping `properties` to the index.
    async fn put_mapping(&self, index: &str, properties: &Value) -> Result<(), SearchError>;
    /// Index-level settings object (e.g. `{ "analysis": { ... } }`).
    async fn get_settings(&self, index: &str) -> Result<Value, SearchError>;
    async fn put_settings(&self, index: &str, settings: &Value) -> Result<(), SearchError>;
    async fn close_index(&self, index: &str) -> Result<(), SearchError>;
    async fn open_index(&self, index: &str) -> Result<(), SearchError>;

    async fn write_document(&self, write: DocumentWrite) -> Result<WriteAck, SearchError>;
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<StoredDocument>, SearchError>;
    async fn delete_document(&self, index: &str, id: &str, refresh: bool) -> Result<(), SearchError>;

    /// Execute a search request body (`query`, `from`, `size`).
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError>;
    /// Count documents matching a query clause.
    async fn count(&self, index: &str, query: &Value) -> Result<u64, SearchError>;
}

/// Authoritative entity store that search documents mirror.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    /// Whether this store can rehydrate entities of the given type name.
    fn manages(&self, _type_name: &str) -> bool {
        true
    }

    /// Persist an entity, returning the stored version (with its id assigned).
    async fn prior_save(&self, entity: Entity) -> Result<Entity, SearchError>;

    /// Remove an entity. Removing a missing entity is not an error.
    async fn prior_remove(&self, canon: &EntityCanon, id: &str) -> Result<(), SearchError>;

    /// Fetch the entities that still exist among `ids`, in any order.
    async fn list_by_ids(&self, type_name: &str, ids: &[String]) -> Result<Vec<Entity>, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_kind_helpers() {
        assert!(SearchError::not_found("idx", "1").is_not_found());
        assert!(SearchError::Conflict("exists".into()).is_conflict());
        assert!(!SearchError::Backend("boom".into()).is_not_found());
    }

    #[test]
    fn test_divergence_message_names_entity() {
        let entity = Entity::new(EntityCanon::new("foo")).with_id("abcd");
        let err = SearchError::diverged(entity, SearchError::Backend("write failed".into()));
        let msg = err.to_string();
        assert!(msg.contains("foo 'abcd'"));
        assert!(msg.contains("write failed"));
    }

    #[test]
    fn test_hit_doc_type() {
        let hit = SearchHit {
            index: "idx".into(),
            id: "1".into(),
            score: None,
            source: json!({"entity$": "foo"}).as_object().cloned().unwrap(),
        };
        assert_eq!(hit.doc_type(), Some("foo"));
    }
}
