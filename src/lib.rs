//! # Search Sync
//!
//! Keeps a full-text search index in step with an authoritative entity store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Caller / Command                        │
//! │  • save_entity / remove_entity (typed entities)             │
//! │  • act(Command) for index, document and search messages     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SearchSync (coordinator)                    │
//! │  • Save pipeline: persist → filter → project → id → write   │
//! │  • Index lifecycle: ensure, analyzers, mappings             │
//! │  • Search: query building, rehydration, stale-hit dropping  │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────┐  ┌──────────────────────────────┐
//! │  SystemOfRecord           │  │  SearchClient                │
//! │  • authoritative entities │  │  • Elasticsearch (REST)      │
//! │  • prior save / remove    │  │  • in-memory                 │
//! └───────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use search_sync::{Entity, EntityCanon, SearchSync, SearchSyncConfig};
//! use search_sync::search::{SearchQuery, SearchRequest};
//! use search_sync::storage::elasticsearch::ElasticsearchClient;
//! use search_sync::storage::memory::InMemoryRecordStore;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SearchSyncConfig::default();
//!     let client = ElasticsearchClient::new(&config.connection).expect("client");
//!
//!     let sync = SearchSync::new(config, Arc::new(client))
//!         .expect("config")
//!         .with_records(Arc::new(InMemoryRecordStore::new()));
//!     sync.start().await.expect("Search backend unreachable");
//!
//!     let entity = Entity::new(EntityCanon::new("product"))
//!         .with_attr("name", json!("salted caramel"));
//!     let saved = sync.save_entity(entity).await.expect("save");
//!     println!("Saved {:?} into {}", saved.entity.id(), saved.index);
//!
//!     let hits = sync
//!         .search(SearchRequest::new(SearchQuery::text("caramel")))
//!         .await
//!         .expect("search");
//!     println!("{} hit(s)", hits.total);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The main [`SearchSync`] orchestrating all components
//! - [`document`]: Projection, identity resolution and save filters
//! - [`search`]: Query construction and index definitions
//! - [`storage`]: Collaborator traits and backends (Elasticsearch, memory)
//! - [`command`]: JSON command dispatch
//! - [`entity`]: Entities and canonical type names

pub mod command;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod entity;
pub mod metrics;
pub mod search;
pub mod storage;

pub use command::{Command, FieldArg};
pub use config::{ConnectionConfig, EntityFieldConfig, FieldSpec, FilterPredicate, SearchSyncConfig};
pub use coordinator::{
    EnsureOutcome, IndexWrite, LoadResult, RemoveOutcome, SaveOutcome, SaveStage, SearchSync,
    SyncState,
};
pub use entity::{Entity, EntityCanon};
pub use metrics::LatencyTimer;
pub use search::{FieldWeight, SearchQuery, SearchRequest};
pub use storage::traits::{
    SearchClient, SearchError, SearchHit, SearchResponse, StoredDocument, SystemOfRecord, WriteAck,
};
