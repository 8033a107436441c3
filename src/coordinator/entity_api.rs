// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity synchronization: save and remove through the system of record,
//! mirrored into the search index.
//!
//! A save runs as an ordered pipeline of [`SaveStage`]s over one
//! [`SaveContext`]. Each stage either hands the context to the next stage or
//! finishes the save early (a matching save filter does this).

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::{project, resolve_id, stamp_discriminator};
use crate::entity::{Entity, EntityCanon, ID_FIELD};
use crate::metrics::{self, LatencyTimer};
use crate::storage::traits::{DocumentWrite, SearchError, WriteMode};

use super::{IndexWrite, RemoveOutcome, SaveOutcome, SearchSync};

/// Steps of an entity save, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    /// Save through the system of record
    PriorPersist,
    /// Skip indexing when a save filter matches
    FilterCheck,
    /// Build the document body
    Project,
    /// Make sure the entity carries its permanent id
    ResolveId,
    /// Create or upsert the document
    Write,
}

impl SaveStage {
    pub const PIPELINE: [SaveStage; 5] = [
        SaveStage::PriorPersist,
        SaveStage::FilterCheck,
        SaveStage::Project,
        SaveStage::ResolveId,
        SaveStage::Write,
    ];
}

impl std::fmt::Display for SaveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriorPersist => write!(f, "prior_persist"),
            Self::FilterCheck => write!(f, "filter_check"),
            Self::Project => write!(f, "project"),
            Self::ResolveId => write!(f, "resolve_id"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// State threaded through the save pipeline.
#[derive(Debug)]
struct SaveContext {
    entity: Entity,
    type_name: String,
    index: String,
    /// The entity had an id before the save started
    is_update: bool,
    document: Map<String, Value>,
}

impl SaveContext {
    fn finish(self, write: IndexWrite) -> SaveOutcome {
        SaveOutcome {
            entity: self.entity,
            index: self.index,
            write,
        }
    }
}

enum Flow {
    Next(SaveContext),
    Finish(SaveOutcome),
}

impl SearchSync {
    /// Save an entity through the system of record and mirror it into its index.
    ///
    /// A system-of-record failure aborts before the index is touched. An index
    /// failure after a successful system-of-record save is returned as
    /// [`SearchError::PartialDivergence`] holding the saved entity; the saved
    /// entity is not rolled back.
    #[tracing::instrument(skip(self, entity), fields(entity_type = %entity.type_name()))]
    pub async fn save_entity(&self, entity: Entity) -> Result<SaveOutcome, SearchError> {
        let _timer = LatencyTimer::new("save_entity");

        let result = self.run_save(entity).await;
        let status = match &result {
            Ok(outcome) if outcome.write == IndexWrite::Skipped => "skipped",
            Ok(_) => "success",
            Err(_) => "error",
        };
        metrics::record_operation("save_entity", status);
        result
    }

    async fn run_save(&self, entity: Entity) -> Result<SaveOutcome, SearchError> {
        if entity.canon.name.trim().is_empty() {
            return Err(SearchError::Validation("entity type name is required".into()));
        }
        self.records()?;

        let type_name = entity.type_name();
        let mut ctx = SaveContext {
            index: self.config.index_for(&type_name).to_string(),
            is_update: entity.id().is_some(),
            type_name,
            entity,
            document: Map::new(),
        };

        for stage in SaveStage::PIPELINE {
            ctx = match self.run_stage(stage, ctx).await? {
                Flow::Next(ctx) => ctx,
                Flow::Finish(outcome) => return Ok(outcome),
            };
        }

        // Write always finishes the pipeline
        Err(SearchError::Backend("save pipeline ended without a write".into()))
    }

    async fn run_stage(&self, stage: SaveStage, mut ctx: SaveContext) -> Result<Flow, SearchError> {
        match stage {
            SaveStage::PriorPersist => {
                ctx.entity = self.records()?.prior_save(ctx.entity).await?;
                Ok(Flow::Next(ctx))
            }
            SaveStage::FilterCheck => {
                let skip = self
                    .filters
                    .get(&ctx.type_name)
                    .is_some_and(|filter| filter.matches(&ctx.entity.snapshot()));
                if skip {
                    debug!(entity_type = %ctx.type_name, id = ?ctx.entity.id(), "Save filter matched, not indexing");
                    metrics::record_filtered_save(&ctx.type_name);
                    return Ok(Flow::Finish(ctx.finish(IndexWrite::Skipped)));
                }
                Ok(Flow::Next(ctx))
            }
            SaveStage::Project => {
                let snapshot = ctx.entity.snapshot();
                let mut document = project(&ctx.type_name, &snapshot, self.config.entity(&ctx.type_name));
                stamp_discriminator(&mut document, &ctx.type_name);
                ctx.document = document;
                Ok(Flow::Next(ctx))
            }
            SaveStage::ResolveId => {
                let id = resolve_id(&mut ctx.entity);
                ctx.document.insert(ID_FIELD.to_string(), Value::String(id));
                Ok(Flow::Next(ctx))
            }
            SaveStage::Write => {
                let write = match self.write_entity_document(&mut ctx).await {
                    Ok(write) => write,
                    Err(e) => {
                        warn!(
                            entity_type = %ctx.type_name,
                            id = ?ctx.entity.id(),
                            index = %ctx.index,
                            error = %e,
                            "Index write failed after system-of-record save"
                        );
                        metrics::record_divergence("save_entity");
                        return Err(SearchError::diverged(ctx.entity, e));
                    }
                };
                Ok(Flow::Finish(ctx.finish(write)))
            }
        }
    }

    async fn write_entity_document(&self, ctx: &mut SaveContext) -> Result<IndexWrite, SearchError> {
        self.ensure_index(&ctx.index).await?;

        let (mode, write) = if ctx.is_update {
            (WriteMode::Upsert, IndexWrite::Upserted)
        } else {
            (WriteMode::Create, IndexWrite::Created)
        };

        let ack = self
            .client
            .write_document(DocumentWrite {
                index: ctx.index.clone(),
                id: ctx.entity.id().map(str::to_string),
                body: std::mem::take(&mut ctx.document),
                mode,
                refresh: self.config.refresh_on_save,
            })
            .await?;

        metrics::record_index_write(&mode.to_string());
        debug!(index = %ack.index, id = %ack.id, mode = %mode, "Entity document written");
        Ok(write)
    }

    /// Remove an entity from the system of record, then its mirrored document.
    ///
    /// A document already missing from the index is not an error. An index
    /// failure after the system-of-record removal is returned as
    /// [`SearchError::PartialDivergence`].
    #[tracing::instrument(skip(self, canon), fields(entity_type = %canon.type_name()))]
    pub async fn remove_entity(&self, canon: &EntityCanon, id: &str) -> Result<RemoveOutcome, SearchError> {
        let _timer = LatencyTimer::new("remove_entity");

        if canon.name.trim().is_empty() {
            return Err(SearchError::Validation("entity type name is required".into()));
        }
        if id.trim().is_empty() {
            return Err(SearchError::Validation("entity id is required".into()));
        }

        let result = self.run_remove(canon, id).await;
        metrics::record_operation("remove_entity", if result.is_ok() { "success" } else { "error" });
        result
    }

    async fn run_remove(&self, canon: &EntityCanon, id: &str) -> Result<RemoveOutcome, SearchError> {
        self.records()?.prior_remove(canon, id).await?;

        let type_name = canon.type_name();
        let index = self.config.index_for(&type_name);
        let document_existed = match self
            .client
            .delete_document(index, id, self.config.refresh_on_save)
            .await
        {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!(index = %index, id = %id, "Mirrored document already absent");
                false
            }
            Err(e) => {
                warn!(index = %index, id = %id, error = %e, "Index delete failed after system-of-record remove");
                metrics::record_divergence("remove_entity");
                let entity = Entity::new(canon.clone()).with_id(id);
                return Err(SearchError::diverged(entity, e));
            }
        };

        Ok(RemoveOutcome {
            id: id.to_string(),
            document_existed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::SearchSyncConfig;
    use crate::storage::memory::{InMemoryRecordStore, InMemorySearchClient};
    use crate::storage::traits::SearchClient;

    use super::*;

    fn setup(config: SearchSyncConfig) -> (SearchSync, Arc<InMemorySearchClient>, Arc<InMemoryRecordStore>) {
        let client = Arc::new(InMemorySearchClient::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let sync = SearchSync::new(config, client.clone())
            .unwrap()
            .with_records(records.clone());
        (sync, client, records)
    }

    #[test]
    fn test_pipeline_order() {
        let names: Vec<String> = SaveStage::PIPELINE.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["prior_persist", "filter_check", "project", "resolve_id", "write"]);
    }

    #[tokio::test]
    async fn test_new_entity_created_with_assigned_id() {
        let (sync, client, records) = setup(SearchSyncConfig::default());

        let entity = Entity::new(EntityCanon::new("foo")).with_attr("name", json!("caramel"));
        let outcome = sync.save_entity(entity).await.unwrap();

        assert_eq!(outcome.write, IndexWrite::Created);
        assert_eq!(outcome.index, "search");
        let id = outcome.entity.id().unwrap();
        assert!(records.get("foo", id).is_some());

        let doc = client.get_document("search", id).await.unwrap().unwrap();
        assert_eq!(doc.source["id"], json!(id));
        assert_eq!(doc.source["entity$"], "foo");
        assert_eq!(doc.source["name"], "caramel");
    }

    #[tokio::test]
    async fn test_entity_with_id_is_upserted() {
        let (sync, client, _) = setup(SearchSyncConfig::default());

        let entity = Entity::new(EntityCanon::new("foo")).with_id("abc").with_attr("a", json!(1));
        let outcome = sync.save_entity(entity).await.unwrap();
        assert_eq!(outcome.write, IndexWrite::Upserted);
        assert_eq!(client.document_count("search"), 1);
    }

    #[tokio::test]
    async fn test_configured_entity_goes_to_its_index() {
        let config = SearchSyncConfig::from_json(
            r#"{"entities": {"sys_user": {"index": "people", "fields": ["name"]}}}"#,
        )
        .unwrap();
        let (sync, client, _) = setup(config);

        let entity = Entity::new(EntityCanon::new("user").with_base("sys"))
            .with_attr("name", json!("ada"))
            .with_attr("password", json!("secret"));
        let outcome = sync.save_entity(entity).await.unwrap();

        assert_eq!(outcome.index, "people");
        let doc = client
            .get_document("people", outcome.entity.id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(doc.source.get("password").is_none());
        assert_eq!(doc.source["entity$"], "sys_user");
        // The system of record's result is returned in full
        assert_eq!(outcome.entity.attributes["password"], "secret");
    }

    #[tokio::test]
    async fn test_save_without_records_is_validation_error() {
        let sync = SearchSync::new(SearchSyncConfig::default(), Arc::new(InMemorySearchClient::new())).unwrap();
        let err = sync.save_entity(Entity::new(EntityCanon::new("foo"))).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[tokio::test]
    async fn test_save_with_empty_type_is_validation_error() {
        let (sync, client, records) = setup(SearchSyncConfig::default());
        let err = sync.save_entity(Entity::new(EntityCanon::new(""))).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
        assert!(records.is_empty());
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_entity_twice() {
        let (sync, _, records) = setup(SearchSyncConfig::default());
        let canon = EntityCanon::new("foo");
        sync.save_entity(Entity::new(canon.clone()).with_id("x")).await.unwrap();

        let first = sync.remove_entity(&canon, "x").await.unwrap();
        assert!(first.document_existed);
        assert!(records.get("foo", "x").is_none());

        let second = sync.remove_entity(&canon, "x").await.unwrap();
        assert!(!second.document_existed);
    }
}
