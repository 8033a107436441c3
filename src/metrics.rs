// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for search-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `search_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: save_entity, remove_entity, save, load, remove, search, count, ...
//! - `status`: success, error, skipped
//! - `entity_type`: canonical entity type name

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "search_sync_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "search_sync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a document write by mode (create / upsert)
pub fn record_index_write(mode: &str) {
    counter!(
        "search_sync_index_writes_total",
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Record a save that a skip-filter kept out of the index
pub fn record_filtered_save(entity_type: &str) {
    counter!(
        "search_sync_filtered_saves_total",
        "entity_type" => entity_type.to_string()
    )
    .increment(1);
}

/// Record hits dropped because their source record no longer exists
pub fn record_stale_hits(entity_type: &str, count: usize) {
    counter!(
        "search_sync_stale_hits_total",
        "entity_type" => entity_type.to_string()
    )
    .increment(count as u64);
}

/// Record a system-of-record change whose index mirror failed
pub fn record_divergence(operation: &str) {
    counter!(
        "search_sync_divergences_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record index lifecycle operations (create, delete, reconcile)
pub fn record_index_operation(operation: &str, success: bool) {
    counter!(
        "search_sync_index_operations_total",
        "operation" => operation.to_string(),
        "status" => if success { "success" } else { "error" }.to_string()
    )
    .increment(1);
}

/// Record number of hits returned by a search
pub fn record_search_results(count: usize) {
    histogram!("search_sync_search_results").record(count as f64);
}

/// Set backend health (1 = healthy, 0 = unreachable)
pub fn set_backend_healthy(healthy: bool) {
    gauge!("search_sync_backend_healthy").set(if healthy { 1.0 } else { 0.0 });
}

/// RAII timer that records latency for an operation when dropped
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
