// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Message-style command surface.
//!
//! Every index and raw-document operation can be sent as a JSON message
//! tagged by `cmd` and answered with a JSON reply:
//!
//! ```text
//! { "cmd": "create-index", "index": "idx1" }               → { "index", "outcome" }
//! { "cmd": "has-index", "index": "idx1" }                  → { "exists" }
//! { "cmd": "delete-index", "index": "idx1" }               → { "deleted" }
//! { "cmd": "save", "type": "t", "data": { .. }, "id": .. } → { "index", "id", "created" }
//! { "cmd": "load", "type": "t", "id": "abcd" }             → { "found", "document" }
//! { "cmd": "remove", "type": "t", "id": "abcd" }           → { "id", "document_existed" }
//! { "cmd": "search", "q": "caramel" }                      → { "total", "hits" }
//! { "cmd": "count", "query": { .. } }                      → { "count" }
//! ```
//!
//! A missing `index` falls back to the configured default index.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::coordinator::{LoadResult, SearchSync};
use crate::search::{FieldWeight, SearchQuery, SearchRequest};
use crate::storage::traits::SearchError;

/// A command message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum Command {
    CreateIndex {
        #[serde(default)]
        index: Option<String>,
        /// Field weights as `name^priority` text or `{ name, priority }`
        #[serde(default)]
        fields: Option<Vec<FieldArg>>,
    },
    HasIndex {
        #[serde(default)]
        index: Option<String>,
    },
    DeleteIndex {
        #[serde(default)]
        index: Option<String>,
    },
    Save {
        #[serde(default)]
        index: Option<String>,
        #[serde(default, rename = "type")]
        doc_type: Option<String>,
        #[serde(default)]
        data: Value,
        #[serde(default, deserialize_with = "optional_id_text")]
        id: Option<String>,
    },
    Load {
        #[serde(default)]
        index: Option<String>,
        #[serde(default, rename = "type")]
        doc_type: Option<String>,
        #[serde(deserialize_with = "id_text")]
        id: String,
    },
    Remove {
        #[serde(default)]
        index: Option<String>,
        #[serde(default, rename = "type")]
        doc_type: Option<String>,
        #[serde(deserialize_with = "id_text")]
        id: String,
    },
    Search {
        #[serde(default)]
        index: Option<String>,
        #[serde(default, rename = "type")]
        doc_type: Option<String>,
        /// Free-text query
        #[serde(default)]
        q: Option<String>,
        /// Structured query clause
        #[serde(default)]
        query: Option<Value>,
        #[serde(default)]
        from: Option<usize>,
        #[serde(default)]
        size: Option<usize>,
    },
    Count {
        #[serde(default)]
        index: Option<String>,
        #[serde(default, rename = "type")]
        doc_type: Option<String>,
        #[serde(default)]
        q: Option<String>,
        #[serde(default)]
        query: Option<Value>,
    },
}

/// One `create-index` field weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldArg {
    /// `name` or `name^priority`
    Text(String),
    Weight(FieldWeight),
}

impl FieldArg {
    fn into_weight(self) -> Result<FieldWeight, SearchError> {
        match self {
            FieldArg::Text(text) => text.parse(),
            FieldArg::Weight(weight) => Ok(weight),
        }
    }
}

/// Document ids may arrive as JSON strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(serde_json::Number),
}

impl IdRepr {
    fn into_text(self) -> String {
        match self {
            IdRepr::Text(text) => text,
            IdRepr::Number(n) => n.to_string(),
        }
    }
}

fn id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    IdRepr::deserialize(deserializer).map(IdRepr::into_text)
}

fn optional_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<IdRepr>::deserialize(deserializer).map(|id| id.map(IdRepr::into_text))
}

impl Command {
    /// Parse a command message.
    pub fn from_json(message: Value) -> Result<Self, SearchError> {
        serde_json::from_value(message)
            .map_err(|e| SearchError::Validation(format!("Invalid command: {}", e)))
    }

    /// The `cmd` tag of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateIndex { .. } => "create-index",
            Command::HasIndex { .. } => "has-index",
            Command::DeleteIndex { .. } => "delete-index",
            Command::Save { .. } => "save",
            Command::Load { .. } => "load",
            Command::Remove { .. } => "remove",
            Command::Search { .. } => "search",
            Command::Count { .. } => "count",
        }
    }
}

fn request(
    index: Option<String>,
    doc_type: Option<String>,
    q: Option<String>,
    query: Option<Value>,
) -> SearchRequest {
    SearchRequest {
        index,
        doc_type,
        query: SearchQuery::from_parts(q, query),
        from: None,
        size: None,
    }
}

fn to_reply<T: Serialize>(value: &T) -> Result<Value, SearchError> {
    serde_json::to_value(value).map_err(|e| SearchError::Backend(format!("Unserializable reply: {}", e)))
}

impl SearchSync {
    /// Execute a command message and build its JSON reply.
    #[tracing::instrument(skip(self, command), fields(cmd = command.name()))]
    pub async fn act(&self, command: Command) -> Result<Value, SearchError> {
        match command {
            Command::CreateIndex { index, fields } => {
                let index = self.index_name(index.as_deref())?;
                let fields = fields
                    .map(|fields| {
                        fields
                            .into_iter()
                            .map(FieldArg::into_weight)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?;
                let outcome = self.create_index(&index, fields).await?;
                Ok(json!({ "index": index, "outcome": outcome }))
            }
            Command::HasIndex { index } => {
                let index = self.index_name(index.as_deref())?;
                Ok(json!({ "exists": self.has_index(&index).await? }))
            }
            Command::DeleteIndex { index } => {
                let index = self.index_name(index.as_deref())?;
                Ok(json!({ "deleted": self.delete_index(&index).await? }))
            }
            Command::Save { index, doc_type, data, id } => {
                let ack = self
                    .save_document(index.as_deref(), doc_type.as_deref(), data, id.as_deref())
                    .await?;
                to_reply(&ack)
            }
            Command::Load { index, doc_type, id } => {
                match self.load(index.as_deref(), doc_type.as_deref(), &id).await? {
                    LoadResult::Found(doc) => Ok(json!({
                        "found": true,
                        "index": doc.index,
                        "id": doc.id,
                        "document": doc.source,
                    })),
                    LoadResult::NotFound => Ok(json!({ "found": false, "id": id, "document": null })),
                }
            }
            Command::Remove { index, doc_type, id } => {
                let outcome = self
                    .remove_document(index.as_deref(), doc_type.as_deref(), &id)
                    .await?;
                to_reply(&outcome)
            }
            Command::Search { index, doc_type, q, query, from, size } => {
                let mut request = request(index, doc_type, q, query);
                request.from = from;
                request.size = size;
                to_reply(&self.search(request).await?)
            }
            Command::Count { index, doc_type, q, query } => {
                let count = self.count(request(index, doc_type, q, query)).await?;
                Ok(json!({ "count": count }))
            }
        }
    }
}
