//! Search API for SearchSync
//!
//! # Architecture
//!
//! ```text
//! search(request)
//!       │
//!       ├─→ ensure_index
//!       │
//!       ├─→ build body (registry field weights, type filter, paging)
//!       │
//!       ├─→ SearchClient::search
//!       │
//!       └─→ rehydrate? (config.rehydrate + system of record)
//!                │
//!                ├─→ group hits by entity$, list_by_ids per group (concurrent)
//!                │
//!                └─→ replace bodies, drop stale hits, correct total
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::document::stamp_discriminator;
use crate::metrics::{self, LatencyTimer};
use crate::search::{FieldWeight, SearchRequest};
use crate::storage::traits::{SearchError, SearchResponse, SystemOfRecord};

use super::SearchSync;

impl SearchSync {
    /// Run a search against an index.
    ///
    /// Free text is matched across the index's weighted fields, a structured
    /// clause is passed through, and no query matches everything. When
    /// rehydration is enabled, hit bodies are replaced by the current records
    /// and hits whose record is gone are dropped from both the hits and the total.
    #[tracing::instrument(skip(self, request), fields(index = ?request.index, doc_type = ?request.doc_type))]
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let _timer = LatencyTimer::new("search");

        let result = self.run_search(&request).await;
        match &result {
            Ok(response) => {
                metrics::record_search_results(response.hits.len());
                metrics::record_operation("search", "success");
            }
            Err(_) => metrics::record_operation("search", "error"),
        }
        result
    }

    async fn run_search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let index = self.index_name(request.index.as_deref())?;
        self.ensure_index(&index).await?;

        let body = request.to_body(&self.search_fields(&index));
        debug!(index = %index, body = %body, "Executing search");
        let response = self.client.search(&index, &body).await?;

        match self.records.as_ref() {
            Some(records) if self.config.rehydrate => rehydrate(records, response).await,
            _ => Ok(response),
        }
    }

    /// Count documents matching a request. Paging is ignored.
    #[tracing::instrument(skip(self, request), fields(index = ?request.index, doc_type = ?request.doc_type))]
    pub async fn count(&self, request: SearchRequest) -> Result<u64, SearchError> {
        let _timer = LatencyTimer::new("count");

        let index = self.index_name(request.index.as_deref())?;
        self.ensure_index(&index).await?;

        let clause = request.to_clause(&self.search_fields(&index));
        let result = self.client.count(&index, &clause).await;
        metrics::record_operation("count", if result.is_ok() { "success" } else { "error" });
        result
    }

    fn search_fields(&self, index: &str) -> Vec<FieldWeight> {
        self.registry.read().search_fields(index, &self.config)
    }
}

/// Replace hit bodies with the system of record's current entities.
///
/// Only types the store manages are touched. Fetches run concurrently, one per
/// type; the first failure aborts the rest.
async fn rehydrate(
    records: &Arc<dyn SystemOfRecord>,
    mut response: SearchResponse,
) -> Result<SearchResponse, SearchError> {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for hit in &response.hits {
        if let Some(doc_type) = hit.doc_type().filter(|t| records.manages(t)) {
            groups.entry(doc_type.to_string()).or_default().push(hit.id.clone());
        }
    }
    if groups.is_empty() {
        return Ok(response);
    }
    let rehydrated: HashSet<String> = groups.keys().cloned().collect();

    let mut tasks = JoinSet::new();
    for (type_name, ids) in groups {
        let records = Arc::clone(records);
        tasks.spawn(async move {
            let entities = records.list_by_ids(&type_name, &ids).await?;
            Ok::<_, SearchError>((type_name, entities))
        });
    }

    let mut current: HashMap<(String, String), Map<String, Value>> = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (type_name, entities) = joined
            .map_err(|e| SearchError::Backend(format!("rehydration task failed: {}", e)))?
            .inspect_err(|e| warn!(error = %e, "Rehydration fetch failed, aborting search"))?;
        for entity in entities {
            let Some(id) = entity.id().map(str::to_string) else {
                continue;
            };
            let mut snapshot = entity.snapshot();
            stamp_discriminator(&mut snapshot, &type_name);
            current.insert((type_name.clone(), id), snapshot);
        }
    }

    let mut stale: HashMap<String, usize> = HashMap::new();
    let hits = std::mem::take(&mut response.hits);
    for mut hit in hits {
        let Some(doc_type) = hit.doc_type().filter(|t| rehydrated.contains(*t)).map(str::to_string) else {
            response.hits.push(hit);
            continue;
        };
        match current.remove(&(doc_type.clone(), hit.id.clone())) {
            Some(source) => {
                hit.source = source;
                response.hits.push(hit);
            }
            None => *stale.entry(doc_type).or_default() += 1,
        }
    }

    for (doc_type, dropped) in stale {
        debug!(entity_type = %doc_type, dropped, "Dropped stale search hits");
        metrics::record_stale_hits(&doc_type, dropped);
        response.total = response.total.saturating_sub(dropped as u64);
    }
    Ok(response)
}
