// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search sync coordinator.
//!
//! [`SearchSync`] ties together:
//! - the search backend ([`SearchClient`])
//! - the authoritative entity store ([`SystemOfRecord`], optional)
//! - the read-only configuration (field allow-lists, save filters, analyzers)
//!
//! # Entity Save
//!
//! ```text
//! PriorPersist → FilterCheck → Project → ResolveId → Write (create | upsert)
//!      │              │
//!      │              └─→ filter matched: done, no index write
//!      └─→ failed: abort, index untouched
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use search_sync::{Entity, EntityCanon, SearchSync, SearchSyncConfig, SyncState};
//! use search_sync::storage::memory::{InMemoryRecordStore, InMemorySearchClient};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sync = SearchSync::new(SearchSyncConfig::default(), Arc::new(InMemorySearchClient::new()))
//!     .unwrap()
//!     .with_records(Arc::new(InMemoryRecordStore::new()));
//!
//! sync.start().await.unwrap();
//! assert_eq!(sync.state(), SyncState::Ready);
//!
//! let entity = Entity::new(EntityCanon::new("foo")).with_attr("name", json!("caramel"));
//! let saved = sync.save_entity(entity).await.unwrap();
//! assert!(saved.entity.id().is_some());
//! # }
//! ```

mod document_api;
mod entity_api;
mod index_api;
mod lifecycle;
mod search_api;
mod types;

pub use entity_api::SaveStage;
pub use types::{EnsureOutcome, IndexWrite, LoadResult, RemoveOutcome, SaveOutcome, SyncState};

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};

use crate::config::SearchSyncConfig;
use crate::document::SaveFilter;
use crate::search::IndexRegistry;
use crate::storage::traits::{SearchClient, SearchError, SystemOfRecord};

/// Synchronizes domain entities into a search index.
///
/// # Thread Safety
///
/// `SearchSync` is `Send + Sync`. Operations on different entities are
/// independent and may run concurrently; the only mutable state is the index
/// registry and the set of indexes already ensured.
pub struct SearchSync {
    /// Configuration (read-only after construction)
    pub(super) config: SearchSyncConfig,

    /// Search backend
    pub(super) client: Arc<dyn SearchClient>,

    /// System of record (required for entity saves/removes and rehydration)
    pub(super) records: Option<Arc<dyn SystemOfRecord>>,

    /// Compiled save-skip filters by entity type name
    pub(super) filters: HashMap<String, SaveFilter>,

    /// Searchable field weights registered per index
    pub(super) registry: RwLock<IndexRegistry>,

    /// Indexes already ensured by this instance
    pub(super) known_indexes: DashSet<String>,

    /// Per-index locks so only one caller creates or reconciles an index
    pub(super) ensure_locks: DashMap<String, Arc<Mutex<()>>>,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<SyncState>,

    /// Lifecycle state receiver (for internal use)
    pub(super) state_rx: watch::Receiver<SyncState>,
}

impl SearchSync {
    /// Create a coordinator over a search client.
    ///
    /// Fails with [`SearchError::Validation`] when a save filter pattern does not compile.
    pub fn new(config: SearchSyncConfig, client: Arc<dyn SearchClient>) -> Result<Self, SearchError> {
        let (state_tx, state_rx) = watch::channel(SyncState::Created);

        let filters = config
            .save_filters
            .iter()
            .map(|(entity_type, predicates)| {
                SaveFilter::compile(predicates).map(|f| (entity_type.clone(), f))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            config,
            client,
            records: None,
            filters,
            registry: RwLock::new(IndexRegistry::new()),
            known_indexes: DashSet::new(),
            ensure_locks: DashMap::new(),
            state: state_tx,
            state_rx,
        })
    }

    /// Attach the system of record.
    #[must_use]
    pub fn with_records(mut self, records: Arc<dyn SystemOfRecord>) -> Self {
        self.records = Some(records);
        self
    }

    /// Get current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn config(&self) -> &SearchSyncConfig {
        &self.config
    }

    /// The wrapped search client, for calls the coordinator does not cover.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    pub(super) fn records(&self) -> Result<&Arc<dyn SystemOfRecord>, SearchError> {
        self.records.as_ref().ok_or_else(|| {
            SearchError::Validation("no system of record attached".into())
        })
    }

    /// Resolve an optional index name against the configured default.
    pub(super) fn index_name(&self, index: Option<&str>) -> Result<String, SearchError> {
        match index {
            None => Ok(self.config.default_index.clone()),
            Some(name) if name.trim().is_empty() => {
                Err(SearchError::Validation("index name must not be empty".into()))
            }
            Some(name) => Ok(name.to_string()),
        }
    }
}
