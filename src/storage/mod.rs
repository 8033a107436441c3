// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collaborator capabilities and their backends.
//!
//! - [`traits`]: `SearchClient`, `SystemOfRecord`, `SearchError`
//! - [`memory`]: in-process search index and record store
//! - [`elasticsearch`]: REST client for a single Elasticsearch node

pub mod elasticsearch;
pub mod memory;
pub mod traits;
