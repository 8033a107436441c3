//! Lifecycle: connectivity probe and index existence guarantees.
//!
//! Every operation that touches an index goes through [`SearchSync::ensure_index`]
//! first. Creation is idempotent: a concurrent creator winning the race is
//! treated as success.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::search::{analyzers_match, creation_body, mapping_properties};
use crate::storage::traits::SearchError;

use super::{EnsureOutcome, SearchSync, SyncState};

impl SearchSync {
    /// Probe the search backend before first use.
    ///
    /// The probe is bounded by `connection.ping_timeout_ms`. On failure the
    /// state stays `Created` and a [`SearchError::Connectivity`] is returned;
    /// nothing is retried.
    #[tracing::instrument(skip(self), fields(url = %self.config.connection.url))]
    pub async fn start(&self) -> Result<(), SearchError> {
        let _ = self.state.send(SyncState::Connecting);
        let timeout = Duration::from_millis(self.config.connection.ping_timeout_ms);

        let probe = match tokio::time::timeout(timeout, self.client.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(SearchError::Connectivity(msg))) => Err(SearchError::Connectivity(msg)),
            Ok(Err(e)) => Err(SearchError::Connectivity(e.to_string())),
            Err(_) => Err(SearchError::Connectivity(format!(
                "ping timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        match probe {
            Ok(()) => {
                metrics::set_backend_healthy(true);
                let _ = self.state.send(SyncState::Ready);
                info!("Search backend reachable");
                Ok(())
            }
            Err(e) => {
                metrics::set_backend_healthy(false);
                let _ = self.state.send(SyncState::Created);
                error!(error = %e, "Search backend unreachable");
                Err(e)
            }
        }
    }

    /// Make sure `name` exists, creating it when absent.
    ///
    /// For an index that already existed, missing mapping properties are added
    /// and configured analyzers are re-applied if they differ. Concurrent
    /// first calls for the same index are serialized, so only one of them
    /// creates or reconciles it.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_index(&self, name: &str) -> Result<EnsureOutcome, SearchError> {
        let name = self.index_name(Some(name))?;
        if self.known_indexes.contains(&name) {
            return Ok(EnsureOutcome::Existing);
        }

        let lock = self.ensure_locks.entry(name.clone()).or_default().clone();
        let _guard = lock.lock().await;
        // Another caller may have finished while we waited
        if self.known_indexes.contains(&name) {
            return Ok(EnsureOutcome::Existing);
        }

        let outcome = if self.client.index_exists(&name).await? {
            self.reconcile_mapping(&name).await?;
            if self.reconcile_analyzers(&name).await? {
                EnsureOutcome::Reconciled
            } else {
                EnsureOutcome::Existing
            }
        } else {
            let body = creation_body(&name, &self.config);
            match self.client.create_index(&name, &body).await {
                Ok(()) => {
                    metrics::record_index_operation("create", true);
                    info!(index = %name, "Search index created");
                    EnsureOutcome::Created
                }
                Err(e) if e.is_conflict() => {
                    debug!(index = %name, "Index created concurrently, treating as existing");
                    EnsureOutcome::Existing
                }
                Err(e) => {
                    metrics::record_index_operation("create", false);
                    return Err(e);
                }
            }
        };

        self.known_indexes.insert(name);
        Ok(outcome)
    }

    /// Add configured mapping properties the index does not have yet.
    async fn reconcile_mapping(&self, name: &str) -> Result<(), SearchError> {
        let current = self.client.get_mapping(name).await?;
        let missing: Map<String, Value> = mapping_properties(name, &self.config)
            .into_iter()
            .filter(|(field, _)| current.get(field).is_none())
            .collect();

        if !missing.is_empty() {
            debug!(index = %name, fields = missing.len(), "Adding missing mapping properties");
            self.client.put_mapping(name, &Value::Object(missing)).await?;
        }
        Ok(())
    }

    /// Re-apply configured analyzers when the index's differ.
    ///
    /// Analysis settings can only change on a closed index, so this closes,
    /// updates, and reopens. The index is reopened even if the update fails.
    /// Returns whether settings were applied.
    async fn reconcile_analyzers(&self, name: &str) -> Result<bool, SearchError> {
        let Some(ref analyzers) = self.config.analyzers else {
            return Ok(false);
        };

        let current = self.client.get_settings(name).await?;
        if analyzers_match(analyzers, &current) {
            return Ok(false);
        }

        info!(index = %name, "Analyzer settings differ, re-applying");
        self.client.close_index(name).await?;
        let updated = self
            .client
            .put_settings(name, &json!({ "analysis": analyzers }))
            .await;
        let reopened = self.client.open_index(name).await;

        if let Err(ref e) = updated {
            warn!(index = %name, error = %e, "Failed to update analyzers");
        }
        if let Err(ref e) = reopened {
            error!(index = %name, error = %e, "Failed to reopen index after analyzer update");
        }
        metrics::record_index_operation("reconcile", updated.is_ok() && reopened.is_ok());

        updated?;
        reopened?;
        Ok(true)
    }
}
