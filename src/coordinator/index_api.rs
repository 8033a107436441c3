// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index management API: create-index, has-index, delete-index.

use tracing::{debug, info};

use crate::metrics;
use crate::search::{FieldWeight, IndexDefinition};
use crate::storage::traits::SearchError;

use super::{EnsureOutcome, SearchSync};

impl SearchSync {
    /// Register the searchable field weights of an index and make sure it exists.
    ///
    /// Without explicit fields the configured `default_fields` are used.
    #[tracing::instrument(skip(self, fields))]
    pub async fn create_index(
        &self,
        name: &str,
        fields: Option<Vec<FieldWeight>>,
    ) -> Result<EnsureOutcome, SearchError> {
        let name = self.index_name(Some(name))?;
        let fields = match fields {
            Some(fields) => fields,
            None => self
                .config
                .default_fields
                .iter()
                .map(|f| f.parse())
                .collect::<Result<Vec<FieldWeight>, _>>()?,
        };

        debug!(index = %name, fields = fields.len(), "Registering index definition");
        let definition = fields
            .into_iter()
            .fold(IndexDefinition::new(&name), IndexDefinition::with_field);
        self.registry.write().register(definition);

        self.ensure_index(&name).await
    }

    /// Whether the index exists in the search backend.
    pub async fn has_index(&self, name: &str) -> Result<bool, SearchError> {
        let name = self.index_name(Some(name))?;
        self.client.index_exists(&name).await
    }

    /// Delete an index. Returns `false` when it did not exist.
    ///
    /// The registered field weights are kept so a later re-create searches
    /// the same fields.
    #[tracing::instrument(skip(self))]
    pub async fn delete_index(&self, name: &str) -> Result<bool, SearchError> {
        let name = self.index_name(Some(name))?;
        self.known_indexes.remove(&name);

        match self.client.delete_index(&name).await {
            Ok(()) => {
                metrics::record_index_operation("delete", true);
                info!(index = %name, "Search index deleted");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!(index = %name, "Index already absent");
                Ok(false)
            }
            Err(e) => {
                metrics::record_index_operation("delete", false);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::SearchSyncConfig;
    use crate::storage::memory::InMemorySearchClient;

    use super::*;

    fn sync() -> SearchSync {
        SearchSync::new(SearchSyncConfig::default(), Arc::new(InMemorySearchClient::new())).unwrap()
    }

    #[tokio::test]
    async fn test_create_index_registers_default_fields() {
        let sync = sync();
        assert_eq!(sync.create_index("idx1", None).await.unwrap(), EnsureOutcome::Created);
        assert!(sync.has_index("idx1").await.unwrap());

        let registry = sync.registry.read();
        let def = registry.get("idx1").unwrap();
        let names: Vec<String> = def.fields.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["id^3", "name^2", "*"]);
    }

    #[tokio::test]
    async fn test_create_index_with_explicit_fields() {
        let sync = sync();
        sync.create_index("idx1", Some(vec![FieldWeight::boosted("title", 4)]))
            .await
            .unwrap();
        let registry = sync.registry.read();
        assert_eq!(registry.get("idx1").unwrap().fields, vec![FieldWeight::boosted("title", 4)]);
    }

    #[tokio::test]
    async fn test_delete_index_is_idempotent() {
        let sync = sync();
        sync.create_index("idx1", None).await.unwrap();

        assert!(sync.delete_index("idx1").await.unwrap());
        assert!(!sync.has_index("idx1").await.unwrap());
        assert!(!sync.delete_index("idx1").await.unwrap());

        // Evicted from the known set, so ensure creates it again
        assert_eq!(sync.ensure_index("idx1").await.unwrap(), EnsureOutcome::Created);
    }

    #[tokio::test]
    async fn test_empty_index_name_rejected() {
        let err = sync().has_index("").await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }
}
