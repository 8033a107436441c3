// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Elasticsearch backend for the [`SearchClient`] capability.
//!
//! Talks to one node over the REST API with `reqwest`. Status codes map onto
//! [`SearchError`]:
//! - transport failures and timeouts → `Connectivity`
//! - 404 → `NotFound`
//! - 409, or 400 `resource_already_exists_exception` → `Conflict`
//! - any other 400 → `Validation`
//! - everything else → `Backend`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use super::traits::{
    DocumentWrite, SearchClient, SearchError, SearchHit, SearchResponse, StoredDocument, WriteAck,
    WriteMode,
};

pub struct ElasticsearchClient {
    http: reqwest::Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
}

impl ElasticsearchClient {
    /// Build a client for the configured node. No request is made.
    pub fn new(config: &ConnectionConfig) -> Result<Self, SearchError> {
        let base = Url::parse(&config.url)
            .map_err(|e| SearchError::Validation(format!("Invalid search URL '{}': {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(SearchError::Validation(format!("Invalid search URL '{}'", config.url)));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SearchError::Connectivity(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let request = self.http.request(method, self.url(segments));
        if let Some(ref api_key) = self.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.username {
            request.basic_auth(username, self.password.as_ref())
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SearchError> {
        request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                SearchError::Connectivity(e.to_string())
            } else {
                SearchError::Backend(e.to_string())
            }
        })
    }

    /// Send and decode a JSON reply, mapping error statuses.
    async fn call(
        &self,
        request: RequestBuilder,
        index: &str,
        id: &str,
    ) -> Result<Value, SearchError> {
        let response = self.send(request).await?;
        let status = response.status();
        let body = read_body(response).await?;
        trace!(status = %status, body = %body, "Elasticsearch reply");

        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status, &body, index, id))
        }
    }
}

async fn read_body(response: Response) -> Result<Value, SearchError> {
    let text = response
        .text()
        .await
        .map_err(|e| SearchError::Backend(format!("Failed to read response: {}", e)))?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn status_error(status: StatusCode, body: &Value, index: &str, id: &str) -> SearchError {
    let error_type = body.pointer("/error/type").and_then(Value::as_str).unwrap_or("");
    let reason = body
        .pointer("/error/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => SearchError::not_found(index, id),
        StatusCode::CONFLICT => SearchError::Conflict(reason),
        StatusCode::BAD_REQUEST if error_type == "resource_already_exists_exception" => {
            SearchError::Conflict(reason)
        }
        StatusCode::BAD_REQUEST => SearchError::Validation(reason),
        _ => SearchError::Backend(format!("{}: {}", status, reason)),
    }
}

fn refresh_param(refresh: bool) -> &'static [(&'static str, &'static str)] {
    if refresh {
        &[("refresh", "true")]
    } else {
        &[]
    }
}

/// Per-index responses (`_mapping`, `_settings`) are keyed by concrete index name.
fn first_index_entry(body: Value) -> Value {
    match body {
        Value::Object(map) => map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

#[derive(Deserialize)]
struct WriteReply {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    result: String,
}

#[derive(Deserialize)]
struct GetReply {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

#[derive(Deserialize)]
struct SearchReply {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    total: Total,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// `hits.total` is `{ "value": n }` since 7.x and a bare number before.
#[derive(Deserialize)]
#[serde(untagged)]
enum Total {
    Object { value: u64 },
    Number(u64),
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

fn decode<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T, SearchError> {
    serde_json::from_value(body).map_err(|e| SearchError::Backend(format!("Unexpected reply: {}", e)))
}

#[async_trait]
impl SearchClient for ElasticsearchClient {
    async fn ping(&self) -> Result<(), SearchError> {
        let response = self.send(self.request(Method::GET, &[])).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SearchError::Connectivity(format!("ping returned {}", response.status())))
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self.send(self.request(Method::HEAD, &[index])).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(SearchError::Backend(format!("index exists check returned {}", s))),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError> {
        debug!(index = %index, "PUT index");
        self.call(self.request(Method::PUT, &[index]).json(body), index, index)
            .await
            .map(|_| ())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        self.call(self.request(Method::DELETE, &[index]), index, index)
            .await
            .map(|_| ())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value, SearchError> {
        let body = self
            .call(self.request(Method::GET, &[index, "_mapping"]), index, index)
            .await?;
        let properties = first_index_entry(body)
            .pointer("/mappings/properties")
            .cloned()
            .unwrap_or_else(|| json!({}));
        Ok(properties)
    }

    async fn put_mapping(&self, index: &str, properties: &Value) -> Result<(), SearchError> {
        let body = json!({ "properties": properties });
        self.call(self.request(Method::PUT, &[index, "_mapping"]).json(&body), index, index)
            .await
            .map(|_| ())
    }

    async fn get_settings(&self, index: &str) -> Result<Value, SearchError> {
        let body = self
            .call(self.request(Method::GET, &[index, "_settings"]), index, index)
            .await?;
        let settings = first_index_entry(body)
            .pointer("/settings/index")
            .cloned()
            .unwrap_or_else(|| json!({}));
        Ok(settings)
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        self.call(self.request(Method::PUT, &[index, "_settings"]).json(settings), index, index)
            .await
            .map(|_| ())
    }

    async fn close_index(&self, index: &str) -> Result<(), SearchError> {
        self.call(self.request(Method::POST, &[index, "_close"]), index, index)
            .await
            .map(|_| ())
    }

    async fn open_index(&self, index: &str) -> Result<(), SearchError> {
        self.call(self.request(Method::POST, &[index, "_open"]), index, index)
            .await
            .map(|_| ())
    }

    async fn write_document(&self, write: DocumentWrite) -> Result<WriteAck, SearchError> {
        let index = write.index.as_str();
        let refresh = refresh_param(write.refresh);

        let (request, id) = match (write.mode, write.id.as_deref()) {
            (WriteMode::Create, Some(id)) => (
                self.request(Method::PUT, &[index, "_doc", id]).json(&write.body),
                id,
            ),
            (WriteMode::Create, None) => (
                self.request(Method::POST, &[index, "_doc"]).json(&write.body),
                "",
            ),
            (WriteMode::Upsert, Some(id)) => (
                self.request(Method::POST, &[index, "_update", id])
                    .json(&json!({ "doc": write.body, "doc_as_upsert": true })),
                id,
            ),
            (WriteMode::Upsert, None) => {
                return Err(SearchError::Validation("upsert requires a document id".into()));
            }
        };

        let reply: WriteReply = decode(self.call(request.query(refresh), index, id).await?)?;
        Ok(WriteAck {
            index: reply.index,
            id: reply.id,
            created: reply.result == "created",
        })
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<StoredDocument>, SearchError> {
        let response = self.send(self.request(Method::GET, &[index, "_doc", id])).await?;
        let status = response.status();
        let body = read_body(response).await?;

        // A missing document is a 404 with `found: false`; a missing index has an error body
        if status == StatusCode::NOT_FOUND && body.get("found") == Some(&Value::Bool(false)) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, &body, index, id));
        }

        let reply: GetReply = decode(body)?;
        Ok(reply.found.then(|| StoredDocument {
            index: reply.index,
            id: reply.id,
            source: reply.source,
        }))
    }

    async fn delete_document(&self, index: &str, id: &str, refresh: bool) -> Result<(), SearchError> {
        let request = self
            .request(Method::DELETE, &[index, "_doc", id])
            .query(refresh_param(refresh));
        self.call(request, index, id).await.map(|_| ())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        let reply: SearchReply = decode(
            self.call(self.request(Method::POST, &[index, "_search"]).json(body), index, index)
                .await?,
        )?;

        let total = match reply.hits.total {
            Total::Object { value } => value,
            Total::Number(n) => n,
        };
        let hits = reply
            .hits
            .hits
            .into_iter()
            .map(|h| SearchHit {
                index: h.index,
                id: h.id,
                score: h.score,
                source: h.source,
            })
            .collect();
        Ok(SearchResponse { total, hits })
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64, SearchError> {
        let body = json!({ "query": query });
        let reply = self
            .call(self.request(Method::POST, &[index, "_count"]).json(&body), index, index)
            .await?;
        reply
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::Backend(format!("Unexpected count reply: {}", reply)))
    }
}
