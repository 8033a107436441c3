// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! Query construction and index bookkeeping, independent of the backend.
//!
//! # Architecture
//!
//! ```text
//! SearchRequest (free text | structured | match all)
//!     ↓  + IndexRegistry field weights
//! { "query": multi_match / clause, "from", "size" }
//!     ↓
//! SearchClient::search
//! ```
//!
//! # Field Weights
//!
//! ```rust
//! use search_sync::search::{IndexDefinition, IndexRegistry};
//! use search_sync::SearchSyncConfig;
//!
//! let mut registry = IndexRegistry::new();
//! registry.register(IndexDefinition::new("people").weighted("name", 2).field("bio"));
//!
//! let fields = registry.search_fields("people", &SearchSyncConfig::default());
//! assert_eq!(fields[0].to_string(), "name^2");
//! ```

mod index_manager;
mod query_builder;

pub use index_manager::{
    analyzers_match, creation_body, mapping_properties, IndexDefinition, IndexRegistry,
};
pub use query_builder::{restrict_to_type, FieldWeight, SearchQuery, SearchRequest, TIE_BREAKER};
