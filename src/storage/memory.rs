// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory collaborators.
//!
//! - [`InMemorySearchClient`]: a [`SearchClient`] that evaluates a subset of the
//!   Elasticsearch query DSL (`match_all`, `multi_match`, `match`, `term`,
//!   `ids`, `bool`). Unsupported clauses are rejected with a validation error.
//! - [`InMemoryRecordStore`]: a [`SystemOfRecord`] keyed by type name and id.
//!
//! Both are used by the tests and are handy for embedding without a cluster.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};

use crate::document::generate_id;
use crate::entity::{Entity, EntityCanon, TYPE_FIELD};
use super::traits::{
    DocumentWrite, SearchClient, SearchError, SearchHit, SearchResponse, StoredDocument,
    SystemOfRecord, WriteAck, WriteMode,
};

const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct IndexState {
    open: bool,
    settings: Map<String, Value>,
    properties: Map<String, Value>,
    docs: BTreeMap<String, Map<String, Value>>,
}

impl IndexState {
    fn new() -> Self {
        Self {
            open: true,
            settings: Map::new(),
            properties: Map::new(),
            docs: BTreeMap::new(),
        }
    }
}

pub struct InMemorySearchClient {
    indexes: DashMap<String, IndexState>,
    /// Create missing indexes on first document write
    auto_create: bool,
    writes: AtomicU64,
}

impl InMemorySearchClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indexes: DashMap::new(),
            auto_create: true,
            writes: AtomicU64::new(0),
        }
    }

    /// Reject writes to indexes that were never created.
    #[must_use]
    pub fn without_auto_create(mut self) -> Self {
        self.auto_create = false;
        self
    }

    /// Number of documents in an index (0 if it does not exist)
    #[must_use]
    pub fn document_count(&self, index: &str) -> usize {
        self.indexes.get(index).map(|s| s.docs.len()).unwrap_or(0)
    }

    /// Total document writes accepted since creation
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_open(&self, index: &str) -> bool {
        self.indexes.get(index).is_some_and(|s| s.open)
    }

    fn with_open_index<T>(
        &self,
        index: &str,
        f: impl FnOnce(&IndexState) -> Result<T, SearchError>,
    ) -> Result<T, SearchError> {
        let state = self
            .indexes
            .get(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        if !state.open {
            return Err(SearchError::Backend(format!("index '{}' is closed", index)));
        }
        f(state.value())
    }

    fn matching(
        state: &IndexState,
        index: &str,
        clause: &Value,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits = Vec::new();
        for (id, doc) in &state.docs {
            if let Some(score) = evaluate(clause, id, doc)? {
                hits.push(SearchHit {
                    index: index.to_string(),
                    id: id.clone(),
                    score: Some(score),
                    source: doc.clone(),
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(hits)
    }
}

impl Default for InMemorySearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for InMemorySearchClient {
    async fn ping(&self) -> Result<(), SearchError> {
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        Ok(self.indexes.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError> {
        use dashmap::mapref::entry::Entry;

        match self.indexes.entry(index.to_string()) {
            Entry::Occupied(_) => Err(SearchError::Conflict(format!(
                "index '{}' already exists",
                index
            ))),
            Entry::Vacant(slot) => {
                let mut state = IndexState::new();
                if let Some(settings) = body.get("settings").and_then(Value::as_object) {
                    state.settings = settings.clone();
                }
                if let Some(props) = body
                    .pointer("/mappings/properties")
                    .and_then(Value::as_object)
                {
                    state.properties = props.clone();
                }
                slot.insert(state);
                Ok(())
            }
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        self.indexes
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| SearchError::not_found(index, index))
    }

    async fn get_mapping(&self, index: &str) -> Result<Value, SearchError> {
        let state = self
            .indexes
            .get(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        Ok(Value::Object(state.properties.clone()))
    }

    async fn put_mapping(&self, index: &str, properties: &Value) -> Result<(), SearchError> {
        let mut state = self
            .indexes
            .get_mut(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        let Some(properties) = properties.as_object() else {
            return Err(SearchError::Validation("mapping properties must be an object".into()));
        };
        for (field, mapping) in properties {
            match state.properties.get(field) {
                Some(existing) if existing != mapping => {
                    return Err(SearchError::Conflict(format!(
                        "mapper for '{}' conflicts with existing mapping",
                        field
                    )));
                }
                Some(_) => {}
                None => {
                    state.properties.insert(field.clone(), mapping.clone());
                }
            }
        }
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> Result<Value, SearchError> {
        let state = self
            .indexes
            .get(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        Ok(Value::Object(state.settings.clone()))
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let mut state = self
            .indexes
            .get_mut(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        let Some(settings) = settings.as_object() else {
            return Err(SearchError::Validation("settings must be an object".into()));
        };
        // Analysis is a static setting: only changeable while closed
        if state.open && settings.contains_key("analysis") {
            return Err(SearchError::Backend(format!(
                "can't update non dynamic settings on open index '{}'",
                index
            )));
        }
        for (key, value) in settings {
            state.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn close_index(&self, index: &str) -> Result<(), SearchError> {
        let mut state = self
            .indexes
            .get_mut(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        state.open = false;
        Ok(())
    }

    async fn open_index(&self, index: &str) -> Result<(), SearchError> {
        let mut state = self
            .indexes
            .get_mut(index)
            .ok_or_else(|| SearchError::not_found(index, index))?;
        state.open = true;
        Ok(())
    }

    async fn write_document(&self, write: DocumentWrite) -> Result<WriteAck, SearchError> {
        if !self.auto_create && !self.indexes.contains_key(&write.index) {
            return Err(SearchError::not_found(&write.index, &write.index));
        }
        let mut state = self
            .indexes
            .entry(write.index.clone())
            .or_insert_with(IndexState::new);
        if !state.open {
            return Err(SearchError::Backend(format!("index '{}' is closed", write.index)));
        }

        let id = write.id.unwrap_or_else(generate_id);
        let existed = state.docs.contains_key(&id);
        match (write.mode, state.docs.get_mut(&id)) {
            (WriteMode::Upsert, Some(existing)) => merge_into(existing, write.body),
            _ => {
                state.docs.insert(id.clone(), write.body);
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(WriteAck {
            index: write.index,
            id,
            created: !existed,
        })
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<StoredDocument>, SearchError> {
        self.with_open_index(index, |state| {
            Ok(state.docs.get(id).map(|source| StoredDocument {
                index: index.to_string(),
                id: id.to_string(),
                source: source.clone(),
            }))
        })
    }

    async fn delete_document(&self, index: &str, id: &str, _refresh: bool) -> Result<(), SearchError> {
        let mut state = self
            .indexes
            .get_mut(index)
            .ok_or_else(|| SearchError::not_found(index, id))?;
        state
            .docs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SearchError::not_found(index, id))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        let match_all = json!({ "match_all": {} });
        let clause = body.get("query").unwrap_or(&match_all);
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);

        self.with_open_index(index, |state| {
            let hits = Self::matching(state, index, clause)?;
            Ok(SearchResponse {
                total: hits.len() as u64,
                hits: hits.into_iter().skip(from).take(size).collect(),
            })
        })
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64, SearchError> {
        self.with_open_index(index, |state| {
            Ok(Self::matching(state, index, query)?.len() as u64)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Query DSL subset
// ═══════════════════════════════════════════════════════════════════════════

/// Score of `doc` under `clause`, or `None` when it does not match.
fn evaluate(clause: &Value, id: &str, doc: &Map<String, Value>) -> Result<Option<f64>, SearchError> {
    let Some((kind, params)) = clause.as_object().and_then(|o| o.iter().next()) else {
        return Err(SearchError::Validation(format!("Malformed query clause: {}", clause)));
    };

    match kind.as_str() {
        "match_all" => Ok(Some(1.0)),
        "multi_match" => Ok(multi_match(params, doc)),
        "match" => {
            let (field, query) = single_field(params, "query")?;
            let terms = tokenize(&value_text(&query));
            let score = field_value(doc, &field)
                .map(|v| term_hits(&terms, v) as f64)
                .unwrap_or(0.0);
            Ok((score > 0.0).then_some(score))
        }
        "term" => {
            let (field, expected) = single_field(params, "value")?;
            let matched = field_value(doc, &field).is_some_and(|v| match v {
                Value::Array(items) => items.contains(&expected),
                other => *other == expected,
            });
            Ok(matched.then_some(1.0))
        }
        "ids" => {
            let matched = params
                .get("values")
                .and_then(Value::as_array)
                .is_some_and(|values| values.iter().any(|v| v.as_str() == Some(id)));
            Ok(matched.then_some(1.0))
        }
        "bool" => bool_query(params, id, doc),
        other => Err(SearchError::Validation(format!(
            "Unsupported query clause '{}'",
            other
        ))),
    }
}

fn bool_query(params: &Value, id: &str, doc: &Map<String, Value>) -> Result<Option<f64>, SearchError> {
    let clauses = |key: &str| clauses(params, key);

    let mut score = 0.0;
    for clause in clauses("must") {
        match evaluate(clause, id, doc)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }
    let filters = clauses("filter");
    for clause in &filters {
        if evaluate(clause, id, doc)?.is_none() {
            return Ok(None);
        }
    }
    for clause in clauses("must_not") {
        if evaluate(clause, id, doc)?.is_some() {
            return Ok(None);
        }
    }

    let should = clauses("should");
    let mut should_matched = 0;
    for clause in &should {
        if let Some(s) = evaluate(clause, id, doc)? {
            score += s;
            should_matched += 1;
        }
    }
    let scoring_only = params.get("must").is_some() || !filters.is_empty();
    if !should.is_empty() && !scoring_only && should_matched == 0 {
        return Ok(None);
    }

    // A filter/must_not-only bool matches with a constant score
    Ok(Some(if score > 0.0 { score } else { 1.0 }))
}

fn clauses<'a>(params: &'a Value, key: &str) -> Vec<&'a Value> {
    match params.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

/// `best_fields`: best field score plus `tie_breaker` × the other field scores.
fn multi_match(params: &Value, doc: &Map<String, Value>) -> Option<f64> {
    let terms = tokenize(&value_text(params.get("query")?));
    if terms.is_empty() {
        return None;
    }
    let tie_breaker = params.get("tie_breaker").and_then(Value::as_f64).unwrap_or(0.0);
    let patterns: Vec<(String, f64)> = match params.get("fields").and_then(Value::as_array) {
        Some(fields) => fields
            .iter()
            .filter_map(Value::as_str)
            .map(parse_boost)
            .collect(),
        None => vec![("*".to_string(), 1.0)],
    };

    let mut field_scores: Vec<f64> = Vec::new();
    for (field, value) in doc {
        if field == TYPE_FIELD {
            continue;
        }
        let boost = patterns
            .iter()
            .filter(|(pattern, _)| glob_match(pattern, field))
            .map(|(_, boost)| *boost)
            .fold(None, |acc: Option<f64>, b| Some(acc.map_or(b, |a| a.max(b))));
        if let Some(boost) = boost {
            let hits = term_hits(&terms, value);
            if hits > 0 {
                field_scores.push(boost * hits as f64);
            }
        }
    }

    let best = field_scores.iter().copied().fold(0.0, f64::max);
    if best <= 0.0 {
        return None;
    }
    let rest: f64 = field_scores.iter().sum::<f64>() - best;
    Some(best + tie_breaker * rest)
}

/// `{"field": value}` or `{"field": {"<key>": value}}`
fn single_field(params: &Value, key: &str) -> Result<(String, Value), SearchError> {
    let (field, spec) = params
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or_else(|| SearchError::Validation(format!("Malformed field clause: {}", params)))?;
    let value = match spec {
        Value::Object(o) => o.get(key).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    Ok((field.clone(), value))
}

fn parse_boost(field: &str) -> (String, f64) {
    match field.split_once('^') {
        Some((name, boost)) => (name.to_string(), boost.parse().unwrap_or(1.0)),
        None => (field.to_string(), 1.0),
    }
}

/// `*` wildcards only.
fn glob_match(pattern: &str, field: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == field,
        Some((prefix, rest)) => {
            let Some(tail) = field.strip_prefix(prefix) else {
                return false;
            };
            if rest.is_empty() {
                return true;
            }
            (0..=tail.len())
                .filter(|&i| tail.is_char_boundary(i))
                .any(|i| glob_match(rest, &tail[i..]))
        }
    }
}

fn field_value<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Null | Value::Object(_) => String::new(),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of distinct query terms present in the value's text.
fn term_hits(terms: &[String], value: &Value) -> usize {
    let tokens: HashSet<String> = tokenize(&value_text(value)).into_iter().collect();
    let distinct: HashSet<&String> = terms.iter().collect();
    distinct.into_iter().filter(|t| tokens.contains(*t)).count()
}

/// Merge `patch` into `target`, recursing into nested objects.
fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_into(existing, nested),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// System of record
// ═══════════════════════════════════════════════════════════════════════════

/// In-memory system of record. Assigns a generated id to entities saved without one.
pub struct InMemoryRecordStore {
    records: DashMap<(String, String), Entity>,
    /// Types this store rehydrates; `None` means all
    managed: Option<HashSet<String>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            managed: None,
        }
    }

    /// Only rehydrate the given type names.
    #[must_use]
    pub fn managing<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.managed = Some(types.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, type_name: &str, id: &str) -> Option<Entity> {
        self.records
            .get(&(type_name.to_string(), id.to_string()))
            .map(|r| r.value().clone())
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemOfRecord for InMemoryRecordStore {
    fn manages(&self, type_name: &str) -> bool {
        self.managed.as_ref().map_or(true, |m| m.contains(type_name))
    }

    async fn prior_save(&self, mut entity: Entity) -> Result<Entity, SearchError> {
        let id = match entity.id() {
            Some(id) => id.to_string(),
            None => {
                let id = generate_id();
                entity.id = Some(id.clone());
                id
            }
        };
        self.records.insert((entity.type_name(), id), entity.clone());
        Ok(entity)
    }

    async fn prior_remove(&self, canon: &EntityCanon, id: &str) -> Result<(), SearchError> {
        self.records.remove(&(canon.type_name(), id.to_string()));
        Ok(())
    }

    async fn list_by_ids(&self, type_name: &str, ids: &[String]) -> Result<Vec<Entity>, SearchError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.get(type_name, id))
            .collect())
    }
}
