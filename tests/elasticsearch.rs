//! Elasticsearch Integration Tests
//!
//! Runs the sync layer against a real single-node Elasticsearch started with
//! testcontainers.
//!
//! # Running Tests
//! ```bash
//! # Requires Docker
//! cargo test --test elasticsearch -- --ignored
//! ```

use std::sync::Arc;

use serde_json::json;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

use search_sync::storage::elasticsearch::ElasticsearchClient;
use search_sync::storage::memory::InMemoryRecordStore;
use search_sync::storage::traits::SystemOfRecord;
use search_sync::{
    EnsureOutcome, Entity, EntityCanon, IndexWrite, LoadResult, SearchQuery, SearchRequest,
    SearchSync, SearchSyncConfig, SyncState,
};

// =============================================================================
// Container Helpers
// =============================================================================

/// Single-node Elasticsearch without security (takes ~20s to be ready)
fn elasticsearch_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("docker.elastic.co/elasticsearch/elasticsearch", "8.11.3")
        .with_env_var("discovery.type", "single-node")
        .with_env_var("xpack.security.enabled", "false")
        .with_env_var("ES_JAVA_OPTS", "-Xms512m -Xmx512m")
        .with_exposed_port(9200)
        .with_wait_for(WaitFor::message_on_stdout("started"));
    docker.run(image)
}

fn sync_for(port: u16, extra: serde_json::Value) -> (SearchSync, Arc<InMemoryRecordStore>) {
    let mut config = json!({
        "connection": { "url": format!("http://127.0.0.1:{}", port) },
        "refresh_on_save": true,
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    let config = SearchSyncConfig::from_json(&config.to_string()).expect("config");

    let client = ElasticsearchClient::new(&config.connection).expect("client");
    let records = Arc::new(InMemoryRecordStore::new());
    let sync = SearchSync::new(config, Arc::new(client))
        .expect("sync")
        .with_records(records.clone());
    (sync, records)
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_elasticsearch_end_to_end() {
    let docker = Cli::default();
    let node = elasticsearch_container(&docker);
    let (sync, _) = sync_for(node.get_host_port_ipv4(9200), json!({}));

    sync.start().await.expect("ping");
    assert_eq!(sync.state(), SyncState::Ready);

    assert_eq!(sync.create_index("idx1", None).await.unwrap(), EnsureOutcome::Created);
    assert_eq!(sync.ensure_index("idx1").await.unwrap(), EnsureOutcome::Existing);

    sync.save_document(Some("idx1"), Some("type1"), json!({"name": "caramel"}), Some("abcd"))
        .await
        .expect("save");

    let doc = sync.load(Some("idx1"), Some("type1"), "abcd").await.unwrap();
    assert_eq!(doc.document().expect("found").source["name"], "caramel");

    let response = sync
        .search(SearchRequest::new(SearchQuery::text("caramel")).index("idx1"))
        .await
        .expect("search");
    assert_eq!(response.total, 1);
    assert_eq!(response.hits[0].id, "abcd");

    let removed = sync.remove_document(Some("idx1"), Some("type1"), "abcd").await.unwrap();
    assert!(removed.document_existed);
    let removed = sync.remove_document(Some("idx1"), Some("type1"), "abcd").await.unwrap();
    assert!(!removed.document_existed);
    assert_eq!(sync.load(Some("idx1"), None, "abcd").await.unwrap(), LoadResult::NotFound);

    assert!(sync.delete_index("idx1").await.unwrap());
    assert!(!sync.delete_index("idx1").await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_elasticsearch_entity_sync() {
    let docker = Cli::default();
    let node = elasticsearch_container(&docker);
    let (sync, records) = sync_for(
        node.get_host_port_ipv4(9200),
        json!({
            "rehydrate": true,
            "entities": { "employee": { "fields": ["name", "jobTitle"] } }
        }),
    );

    let canon = EntityCanon::new("employee");
    let first = sync
        .save_entity(
            Entity::new(canon.clone())
                .with_attr("name", json!("Ada"))
                .with_attr("jobTitle", json!("Engineer"))
                .with_attr("salary", json!(1)),
        )
        .await
        .expect("insert");
    assert_eq!(first.write, IndexWrite::Created);
    let id = first.entity.id().expect("id").to_string();

    let second = sync
        .save_entity(first.entity.with_attr("jobTitle", json!("Director")))
        .await
        .expect("update");
    assert_eq!(second.write, IndexWrite::Upserted);

    let doc = sync.load(None, Some("employee"), &id).await.unwrap().document().unwrap();
    assert_eq!(doc.source["jobTitle"], "Director");
    assert!(doc.source.get("salary").is_none());

    // Record gone, index entry stale: dropped from results
    records.prior_remove(&canon, &id).await.unwrap();
    let response = sync
        .search(SearchRequest::new(SearchQuery::text("Ada")).doc_type("employee"))
        .await
        .unwrap();
    assert_eq!(response.total, 0);
    assert!(response.hits.is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_elasticsearch_analyzer_reconcile() {
    let docker = Cli::default();
    let node = elasticsearch_container(&docker);
    let port = node.get_host_port_ipv4(9200);

    let (plain, _) = sync_for(port, json!({}));
    plain.ensure_index("search").await.unwrap();

    let (custom, _) = sync_for(
        port,
        json!({
            "analyzers": {
                "analyzer": { "folding": { "type": "custom", "tokenizer": "standard", "filter": ["lowercase", "asciifolding"] } }
            }
        }),
    );
    assert_eq!(custom.ensure_index("search").await.unwrap(), EnsureOutcome::Reconciled);

    // Index is usable again after close/update/open
    custom
        .save_document(None, Some("t"), json!({"name": "crème"}), Some("1"))
        .await
        .expect("index reopened");
}
