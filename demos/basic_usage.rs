// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic search-sync usage example.
//!
//! Demonstrates, against the in-memory backends:
//! 1. Configuring field allow-lists, a save filter and rehydration
//! 2. Saving entities (insert, update, filtered draft)
//! 3. Free-text search with stale-hit suppression
//! 4. The JSON command surface
//! 5. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use search_sync::storage::memory::{InMemoryRecordStore, InMemorySearchClient};
use search_sync::storage::traits::SystemOfRecord;
use search_sync::{
    Command, Entity, EntityCanon, SearchQuery, SearchRequest, SearchSync, SearchSyncConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for display)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_sync=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           search-sync: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring search-sync...");
    let config = SearchSyncConfig::from_json(
        r#"{
            "refresh_on_save": true,
            "rehydrate": true,
            "entities": {
                "shop_product": {
                    "index": "products",
                    "fields": [{ "name": "name", "priority": 3 }, "description"]
                }
            },
            "save_filters": {
                "shop_product": { "status": "draft" }
            }
        }"#,
    )?;

    let client = Arc::new(InMemorySearchClient::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let sync = SearchSync::new(config, client.clone())?.with_records(records.clone());
    sync.start().await?;
    println!("   ✅ State: {}", sync.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Save entities
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Saving products...");
    let canon = EntityCanon::new("product").with_base("shop");
    let mut ids = Vec::new();
    for (name, description, cost) in [
        ("Salted caramel", "Sea salt and burnt sugar", 4),
        ("Caramel fudge", "Dense and chewy", 3),
        ("Dark chocolate", "Seventy percent cocoa with a caramel swirl", 5),
    ] {
        let entity = Entity::new(canon.clone())
            .with_attr("name", json!(name))
            .with_attr("description", json!(description))
            .with_attr("cost", json!(cost));
        let saved = sync.save_entity(entity).await?;
        let id = saved.entity.id().unwrap_or_default().to_string();
        println!("   └─ {:<16} id={} write={:?}", name, id, saved.write);
        ids.push(id);
    }

    let draft = Entity::new(canon.clone())
        .with_attr("name", json!("Caramel experiment"))
        .with_attr("status", json!("draft"));
    let saved = sync.save_entity(draft).await?;
    println!("   └─ draft            write={:?} (kept out of the index)", saved.write);

    // Update: the entity has an id now, so this is an upsert
    let updated = sync
        .save_entity(
            Entity::new(canon.clone())
                .with_id(ids[1].clone())
                .with_attr("name", json!("Caramel fudge"))
                .with_attr("description", json!("Dense, chewy, and now vegan")),
        )
        .await?;
    println!("   └─ update           write={:?}", updated.write);
    println!("   📊 products index holds {} documents", client.document_count("products"));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Search, then delete a record behind the index's back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Searching for 'caramel'...");
    let request = SearchRequest::new(SearchQuery::text("caramel")).index("products");
    let response = sync.search(request.clone()).await?;
    println!("   └─ total={}", response.total);
    for hit in &response.hits {
        println!("      └─ {} score={:.2} name={}", hit.id, hit.score.unwrap_or(0.0), hit.source["name"]);
    }

    records.prior_remove(&canon, &ids[0]).await?;
    let response = sync.search(request).await?;
    println!("   └─ after record removal: total={} (stale hit dropped)", response.total);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Command surface
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📨 Commands...");
    for message in [
        json!({ "cmd": "has-index", "index": "products" }),
        json!({ "cmd": "count", "index": "products", "type": "shop_product" }),
        json!({ "cmd": "load", "index": "products", "type": "shop_product", "id": ids[2] }),
        json!({ "cmd": "remove", "index": "products", "id": "does-not-exist" }),
    ] {
        let reply = sync.act(Command::from_json(message.clone())?).await?;
        println!("   └─ {} → {}", message["cmd"], reply);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = Vec::new();
    let mut gauges = Vec::new();
    let mut histograms = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, value) in &counters {
            println!("   │  └─ {} = {}", name, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, value) in &gauges {
            println!("   │  └─ {} = {:.2}", name, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, count, avg) in &histograms {
            println!("      └─ {} count={} avg={:.6}", name, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
