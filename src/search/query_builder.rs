// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query Builder - search request construction
//!
//! Turns a caller's query (free text, structured clause, or nothing) into an
//! Elasticsearch-compatible request body.
//!
//! # Example
//!
//! ```rust
//! use search_sync::search::{FieldWeight, SearchQuery, SearchRequest};
//! use serde_json::json;
//!
//! let fields: Vec<FieldWeight> = vec!["id^3".parse().unwrap(), "name^2".parse().unwrap()];
//!
//! // Free text → multi_match best_fields with tie breaker 0.3
//! let clause = SearchQuery::text("caramel").to_clause(&fields);
//! assert_eq!(clause["multi_match"]["fields"], json!(["id^3", "name^2"]));
//! assert_eq!(clause["multi_match"]["tie_breaker"], json!(0.3));
//!
//! // Nothing → match all
//! assert_eq!(SearchQuery::MatchAll.to_clause(&fields), json!({"match_all": {}}));
//!
//! // Request scoped to one entity type
//! let request = SearchRequest::new(SearchQuery::text("caramel"))
//!     .index("idx1")
//!     .doc_type("type1")
//!     .size(5);
//! let body = request.to_body(&fields);
//! assert_eq!(body["size"], 5);
//! assert_eq!(body["query"]["bool"]["filter"][0]["term"]["entity$"], "type1");
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::TYPE_FIELD;
use crate::storage::traits::SearchError;

/// Tie-break weight favouring documents that match several fields.
pub const TIE_BREAKER: f64 = 0.3;

/// A searchable field with its boost, rendered as `name^priority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWeight {
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 { 1 }

impl FieldWeight {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), priority: 1 }
    }

    pub fn boosted(name: impl Into<String>, priority: u32) -> Self {
        Self { name: name.into(), priority }
    }
}

impl std::fmt::Display for FieldWeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Boosts of 1 (or 0) are left off
        if self.priority > 1 {
            write!(f, "{}^{}", self.name, self.priority)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl FromStr for FieldWeight {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, priority) = match s.split_once('^') {
            Some((name, boost)) => {
                let priority = boost.trim().parse::<u32>().map_err(|_| {
                    SearchError::Validation(format!("Invalid field boost in '{}'", s))
                })?;
                (name.trim(), priority)
            }
            None => (s.trim(), 1),
        };
        if name.is_empty() {
            return Err(SearchError::Validation(format!("Empty field name in '{}'", s)));
        }
        Ok(Self::boosted(name, priority))
    }
}

/// What the caller is searching for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchQuery {
    MatchAll,
    /// Free text matched across the index's configured fields
    Text(String),
    /// Query clause passed through verbatim
    Structured(Value),
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Pick the query from optional inputs: text first, then a structured
    /// clause, otherwise match all. Blank text and `{}` count as absent.
    pub fn from_parts(text: Option<String>, structured: Option<Value>) -> Self {
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            return Self::Text(text);
        }
        match structured {
            Some(Value::Null) | None => Self::MatchAll,
            Some(Value::Object(ref map)) if map.is_empty() => Self::MatchAll,
            Some(mut clause) => {
                // Accept a full request body as well as a bare clause
                if let Some(inner) = clause.get_mut("query").map(Value::take) {
                    Self::Structured(inner)
                } else {
                    Self::Structured(clause)
                }
            }
        }
    }

    /// Render the query clause.
    pub fn to_clause(&self, fields: &[FieldWeight]) -> Value {
        match self {
            SearchQuery::MatchAll => json!({ "match_all": {} }),
            SearchQuery::Text(text) => {
                let fields: Vec<String> = fields.iter().map(ToString::to_string).collect();
                json!({
                    "multi_match": {
                        "query": text,
                        "type": "best_fields",
                        "fields": fields,
                        "tie_breaker": TIE_BREAKER,
                    }
                })
            }
            SearchQuery::Structured(clause) => clause.clone(),
        }
    }
}

/// Restrict a clause to documents whose discriminator equals `doc_type`.
pub fn restrict_to_type(clause: Value, doc_type: Option<&str>) -> Value {
    match doc_type {
        Some(doc_type) => json!({
            "bool": {
                "must": [clause],
                "filter": [{ "term": { TYPE_FIELD: doc_type } }],
            }
        }),
        None => clause,
    }
}

/// A search against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Target index (defaults to the configured default index)
    pub index: Option<String>,
    /// Restrict hits to one entity type
    pub doc_type: Option<String>,
    pub query: SearchQuery,
    pub from: Option<usize>,
    pub size: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: SearchQuery) -> Self {
        Self {
            index: None,
            doc_type: None,
            query,
            from: None,
            size: None,
        }
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    #[must_use]
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    #[must_use]
    pub fn from(mut self, from: usize) -> Self {
        self.from = Some(from);
        self
    }

    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// The type-restricted query clause.
    pub fn to_clause(&self, fields: &[FieldWeight]) -> Value {
        restrict_to_type(self.query.to_clause(fields), self.doc_type.as_deref())
    }

    /// Full request body: `query` plus optional `from` / `size`.
    pub fn to_body(&self, fields: &[FieldWeight]) -> Value {
        let mut body = json!({ "query": self.to_clause(fields) });
        if let Some(from) = self.from {
            body["from"] = json!(from);
        }
        if let Some(size) = self.size {
            body["size"] = json!(size);
        }
        body
    }
}
