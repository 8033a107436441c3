//! Integration Tests for Search Sync
//!
//! End-to-end behaviour of the sync layer against the in-memory search index
//! and record store. No external services are needed.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: save, load, search, lifecycle
//! - `sync_*` - Index/record consistency: upsert, stale hits, filters

use std::sync::Arc;

use serde_json::json;

use search_sync::storage::memory::{InMemoryRecordStore, InMemorySearchClient};
use search_sync::storage::traits::{SearchClient, SystemOfRecord};
use search_sync::{
    EnsureOutcome, Entity, EntityCanon, IndexWrite, LoadResult, SearchQuery, SearchRequest,
    SearchSync, SearchSyncConfig, SyncState,
};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    sync: SearchSync,
    client: Arc<InMemorySearchClient>,
    records: Arc<InMemoryRecordStore>,
}

fn harness(config: SearchSyncConfig) -> Harness {
    let client = Arc::new(InMemorySearchClient::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let sync = SearchSync::new(config, client.clone())
        .expect("valid config")
        .with_records(records.clone());
    Harness { sync, client, records }
}

fn config(json: &str) -> SearchSyncConfig {
    SearchSyncConfig::from_json(json).expect("valid config")
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
async fn happy_lifecycle_start() {
    let h = harness(SearchSyncConfig::default());
    assert_eq!(h.sync.state(), SyncState::Created);
    h.sync.start().await.expect("Failed to start");
    assert_eq!(h.sync.state(), SyncState::Ready);
}

#[tokio::test]
async fn happy_save_load_search_end_to_end() {
    let h = harness(config(r#"{"entities": {"type1": {"index": "idx1"}}, "refresh_on_save": true}"#));

    let entity = Entity::new(EntityCanon::new("type1"))
        .with_id("abcd")
        .with_attr("name", json!("caramel"));
    let saved = h.sync.save_entity(entity).await.expect("save");
    assert_eq!(saved.index, "idx1");
    assert_eq!(saved.entity.id(), Some("abcd"));

    let doc = h
        .sync
        .load(Some("idx1"), Some("type1"), "abcd")
        .await
        .expect("load")
        .document()
        .expect("document present");
    assert_eq!(doc.source["name"], "caramel");

    let response = h
        .sync
        .search(SearchRequest::new(SearchQuery::text("caramel")).index("idx1"))
        .await
        .expect("search");
    assert_eq!(response.total, 1);
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].id, "abcd");
}

#[tokio::test]
async fn happy_idempotent_index_creation() {
    let h = harness(SearchSyncConfig::default());
    let first = h.sync.ensure_index("idx1").await.expect("first ensure");
    let second = h.sync.ensure_index("idx1").await.expect("second ensure");
    assert_eq!(first, EnsureOutcome::Created);
    assert_eq!(second, EnsureOutcome::Existing);
    assert!(h.sync.has_index("idx1").await.unwrap());

    // A fresh coordinator sees the index as existing
    let other = SearchSync::new(SearchSyncConfig::default(), h.client.clone()).unwrap();
    assert_eq!(other.ensure_index("idx1").await.unwrap(), EnsureOutcome::Existing);
}

#[tokio::test]
async fn happy_idempotent_delete() {
    let h = harness(SearchSyncConfig::default());
    let outcome = h
        .sync
        .remove_document(Some("idx1"), Some("type1"), "never-existed")
        .await
        .expect("remove of a missing id succeeds");
    assert!(!outcome.document_existed);

    let outcome = h
        .sync
        .remove_entity(&EntityCanon::new("type1"), "never-existed")
        .await
        .expect("entity remove of a missing id succeeds");
    assert!(!outcome.document_existed);
}

#[tokio::test]
async fn happy_field_projection_completeness() {
    let h = harness(config(r#"{"entities": {"foo": {"fields": ["a", "b"]}}}"#));

    let entity = Entity::new(EntityCanon::new("foo"))
        .with_id("1")
        .with_attr("a", json!(1))
        .with_attr("b", json!(2))
        .with_attr("c", json!(3));
    h.sync.save_entity(entity).await.expect("save");

    let doc = h.client.get_document("search", "1").await.unwrap().unwrap();
    let mut keys: Vec<&str> = doc.source.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "entity$", "id"]);
}

#[tokio::test]
async fn happy_default_projection_keeps_everything() {
    let h = harness(SearchSyncConfig::default());

    let entity = Entity::new(EntityCanon::new("bar"))
        .with_id("1")
        .with_attr("a", json!(1))
        .with_attr("nested", json!({"deep": [1, 2]}));
    h.sync.save_entity(entity).await.expect("save");

    let doc = h.client.get_document("search", "1").await.unwrap().unwrap();
    assert_eq!(doc.source["a"], 1);
    assert_eq!(doc.source["nested"], json!({"deep": [1, 2]}));
    assert_eq!(doc.source["entity$"], "bar");
}

#[tokio::test]
async fn happy_identity_assigned_once() {
    let h = harness(SearchSyncConfig::default());

    let saved = h
        .sync
        .save_entity(Entity::new(EntityCanon::new("foo")).with_attr("v", json!(1)))
        .await
        .expect("first save");
    let id = saved.entity.id().expect("id assigned").to_string();
    assert_eq!(id.len(), 32);

    let again = h
        .sync
        .save_entity(saved.entity.with_attr("v", json!(2)))
        .await
        .expect("second save");
    assert_eq!(again.entity.id(), Some(id.as_str()));
    assert_eq!(again.write, IndexWrite::Upserted);
    assert_eq!(h.client.document_count("search"), 1);
}

#[tokio::test]
async fn happy_zoned_entity_type_names() {
    let h = harness(SearchSyncConfig::default());
    let canon = EntityCanon::parse("-/sys/user").expect("canon");

    let saved = h
        .sync
        .save_entity(Entity::new(canon).with_id("u1").with_attr("name", json!("ada")))
        .await
        .unwrap();
    assert_eq!(saved.entity.type_name(), "sys_user");

    let loaded = h.sync.load(None, Some("sys_user"), "u1").await.unwrap();
    assert!(loaded.is_found());
    assert_eq!(h.sync.load(None, Some("user"), "u1").await.unwrap(), LoadResult::NotFound);
}

#[tokio::test]
async fn happy_weighted_fields_rank_matches() {
    let h = harness(config(r#"{"refresh_on_save": true}"#));
    h.sync
        .create_index("products", Some(vec!["title^3".parse().unwrap(), "body".parse().unwrap()]))
        .await
        .unwrap();

    h.sync
        .save_document(Some("products"), Some("p"), json!({"title": "plain", "body": "caramel"}), Some("low"))
        .await
        .unwrap();
    h.sync
        .save_document(Some("products"), Some("p"), json!({"title": "caramel", "body": "plain"}), Some("high"))
        .await
        .unwrap();

    let response = h
        .sync
        .search(SearchRequest::new(SearchQuery::text("caramel")).index("products"))
        .await
        .unwrap();
    let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["high", "low"]);
}

#[tokio::test]
async fn happy_structured_query_passthrough() {
    let h = harness(SearchSyncConfig::default());
    for (id, kind) in [("1", "sweet"), ("2", "salty"), ("3", "sweet")] {
        h.sync
            .save_document(None, Some("snack"), json!({"kind": kind}), Some(id))
            .await
            .unwrap();
    }

    let query = SearchQuery::from_parts(None, Some(json!({"term": {"kind": "sweet"}})));
    let count = h.sync.count(SearchRequest::new(query.clone())).await.unwrap();
    assert_eq!(count, 2);

    let response = h.sync.search(SearchRequest::new(query)).await.unwrap();
    let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
}

// =============================================================================
// Sync Tests - Index / Record Consistency
// =============================================================================

#[tokio::test]
async fn sync_upsert_keeps_single_document() {
    let h = harness(SearchSyncConfig::default());
    let canon = EntityCanon::new("employee");

    let first = Entity::new(canon.clone())
        .with_id("e1")
        .with_attr("name", json!("Ada"))
        .with_attr("jobTitle", json!("Engineer"));
    h.sync.save_entity(first).await.expect("insert");

    let second = Entity::new(canon)
        .with_id("e1")
        .with_attr("name", json!("Ada"))
        .with_attr("jobTitle", json!("Director"));
    let outcome = h.sync.save_entity(second).await.expect("update");
    assert_eq!(outcome.write, IndexWrite::Upserted);

    assert_eq!(h.client.document_count("search"), 1);
    let doc = h.client.get_document("search", "e1").await.unwrap().unwrap();
    assert_eq!(doc.source["jobTitle"], "Director");
}

#[tokio::test]
async fn sync_upsert_heals_missing_document() {
    let h = harness(SearchSyncConfig::default());
    let canon = EntityCanon::new("employee");

    // Entity exists in the record store, index never saw it
    h.records
        .prior_save(Entity::new(canon.clone()).with_id("e9").with_attr("v", json!(1)))
        .await
        .unwrap();
    assert_eq!(h.client.document_count("search"), 0);

    let outcome = h
        .sync
        .save_entity(Entity::new(canon).with_id("e9").with_attr("v", json!(2)))
        .await
        .expect("upsert creates the missing document");
    assert_eq!(outcome.write, IndexWrite::Upserted);
    let doc = h.client.get_document("search", "e9").await.unwrap().unwrap();
    assert_eq!(doc.source["v"], 2);
}

#[tokio::test]
async fn sync_stale_hits_suppressed() {
    let h = harness(config(r#"{"rehydrate": true, "refresh_on_save": true}"#));
    let canon = EntityCanon::new("foo");

    for (id, name) in [("1", "caramel apple"), ("2", "caramel fudge"), ("3", "caramel corn")] {
        h.sync
            .save_entity(Entity::new(canon.clone()).with_id(id).with_attr("name", json!(name)))
            .await
            .unwrap();
    }

    // Delete from the record store only; the index still holds the document
    h.records.prior_remove(&canon, "2").await.unwrap();
    assert_eq!(h.client.document_count("search"), 3);

    let response = h
        .sync
        .search(SearchRequest::new(SearchQuery::text("caramel")))
        .await
        .unwrap();
    assert_eq!(response.total, 2);
    let mut ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "3"]);
    assert!(response.hits.iter().all(|h| h.source["entity$"] == "foo"));
}

#[tokio::test]
async fn sync_rehydration_groups_by_type() {
    let h = harness(config(r#"{"rehydrate": true}"#));

    for (type_name, id) in [("a", "a1"), ("b", "b1"), ("b", "b2")] {
        h.sync
            .save_entity(Entity::new(EntityCanon::new(type_name)).with_id(id).with_attr("v", json!("indexed")))
            .await
            .unwrap();
        // The record moves on without the index hearing about it
        h.records
            .prior_save(Entity::new(EntityCanon::new(type_name)).with_id(id).with_attr("v", json!("current")))
            .await
            .unwrap();
    }

    let response = h.sync.search(SearchRequest::new(SearchQuery::MatchAll)).await.unwrap();
    assert_eq!(response.total, 3);
    for hit in &response.hits {
        assert_eq!(hit.source["v"], "current");
        assert_eq!(hit.source["id"], json!(hit.id));
    }
    let b_only = h
        .sync
        .search(SearchRequest::new(SearchQuery::MatchAll).doc_type("b"))
        .await
        .unwrap();
    assert_eq!(b_only.total, 2);
    assert!(b_only.hits.iter().all(|h| h.source["entity$"] == "b"));
}

#[tokio::test]
async fn sync_filter_skip() {
    let h = harness(config(r#"{"save_filters": {"foo": {"status": "draft"}}}"#));
    let canon = EntityCanon::new("foo");

    let outcome = h
        .sync
        .save_entity(Entity::new(canon.clone()).with_attr("status", json!("draft")))
        .await
        .expect("filtered save succeeds");
    assert_eq!(outcome.write, IndexWrite::Skipped);
    let id = outcome.entity.id().expect("system of record assigned an id");
    assert!(h.records.get("foo", id).is_some());
    assert_eq!(h.client.write_count(), 0);

    let outcome = h
        .sync
        .save_entity(Entity::new(canon).with_attr("status", json!("published")))
        .await
        .unwrap();
    assert_eq!(outcome.write, IndexWrite::Created);
    assert_eq!(h.client.write_count(), 1);
}

#[tokio::test]
async fn sync_filter_pattern() {
    let h = harness(config(r#"{"save_filters": {"foo": {"title": {"pattern": "^tmp-"}}}}"#));
    let canon = EntityCanon::new("foo");

    let skipped = h
        .sync
        .save_entity(Entity::new(canon.clone()).with_attr("title", json!("tmp-123")))
        .await
        .unwrap();
    assert_eq!(skipped.write, IndexWrite::Skipped);

    let written = h
        .sync
        .save_entity(Entity::new(canon).with_attr("title", json!("final")))
        .await
        .unwrap();
    assert_eq!(written.write, IndexWrite::Created);
}

#[tokio::test]
async fn sync_remove_entity_removes_both_sides() {
    let h = harness(SearchSyncConfig::default());
    let canon = EntityCanon::new("foo");
    h.sync
        .save_entity(Entity::new(canon.clone()).with_id("r1"))
        .await
        .unwrap();

    let outcome = h.sync.remove_entity(&canon, "r1").await.unwrap();
    assert!(outcome.document_existed);
    assert!(h.records.get("foo", "r1").is_none());
    assert!(h.client.get_document("search", "r1").await.unwrap().is_none());
}
