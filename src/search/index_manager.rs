// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index Manager
//!
//! Keeps the per-index searchable field weights and builds index creation
//! payloads from configuration.
//!
//! # Index Creation Body
//!
//! ```text
//! PUT /people
//! {
//!   "settings": { "analysis": { ...configured analyzers... } },
//!   "mappings": {
//!     "properties": {
//!       "entity$": { "type": "keyword" },
//!       "bio":     { "type": "text", "analyzer": "english" }
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::{EntityFieldConfig, SearchSyncConfig};
use crate::entity::TYPE_FIELD;
use super::query_builder::FieldWeight;

/// Searchable field set of one index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<FieldWeight>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field with default weight
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldWeight::new(name));
        self
    }

    /// Add a boosted field
    pub fn weighted(mut self, name: impl Into<String>, priority: u32) -> Self {
        self.fields.push(FieldWeight::boosted(name, priority));
        self
    }

    /// Add an already-built field weight
    pub fn with_field(mut self, field: FieldWeight) -> Self {
        self.fields.push(field);
        self
    }
}

/// Registry of index definitions
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: HashMap<String, IndexDefinition>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an index definition
    pub fn register(&mut self, index: IndexDefinition) {
        self.indexes.insert(index.name.clone(), index);
    }

    pub fn remove(&mut self, name: &str) -> Option<IndexDefinition> {
        self.indexes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.values()
    }

    /// Fields a free-text query on `index` is matched against.
    ///
    /// Registered definition first, then the weighted union of entity field
    /// configs targeting the index, then every field.
    pub fn search_fields(&self, index: &str, config: &SearchSyncConfig) -> Vec<FieldWeight> {
        if let Some(def) = self.indexes.get(index) {
            if !def.fields.is_empty() {
                return def.fields.clone();
            }
        }

        let configured = configured_fields(index, config);
        if configured.is_empty() {
            vec![FieldWeight::new("*")]
        } else {
            configured
        }
    }
}

/// Union of allow-listed fields of all entity types written to `index`.
fn configured_fields(index: &str, config: &SearchSyncConfig) -> Vec<FieldWeight> {
    let mut fields: Vec<FieldWeight> = Vec::new();
    for entity in entities_for(index, config) {
        for field in &entity.fields {
            let priority = field.priority().unwrap_or(1);
            match fields.iter_mut().find(|f| f.name == field.name()) {
                Some(existing) => existing.priority = existing.priority.max(priority),
                None => fields.push(FieldWeight::boosted(field.name(), priority)),
            }
        }
    }
    fields
}

/// Entity configs routed to `index`, ordered by type name.
fn entities_for<'a>(index: &str, config: &'a SearchSyncConfig) -> Vec<&'a EntityFieldConfig> {
    let mut types: Vec<(&String, &EntityFieldConfig)> = config
        .entities
        .iter()
        .filter(|(t, _)| config.index_for(t) == index)
        .collect();
    types.sort_by(|a, b| a.0.cmp(b.0));
    types.into_iter().map(|(_, entity)| entity).collect()
}

/// Mapping `properties` for `index`: the discriminator as `keyword`, plus
/// every configured field carrying a type or analyzer hint.
pub fn mapping_properties(index: &str, config: &SearchSyncConfig) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(TYPE_FIELD.to_string(), json!({ "type": "keyword" }));

    for entity in entities_for(index, config) {
        for field in &entity.fields {
            if field.field_type().is_none() && field.analyzer().is_none() {
                continue;
            }
            let mut mapping = Map::new();
            mapping.insert("type".into(), json!(field.field_type().unwrap_or("text")));
            if let Some(analyzer) = field.analyzer() {
                mapping.insert("analyzer".into(), json!(analyzer));
            }
            properties
                .entry(field.name().to_string())
                .or_insert(Value::Object(mapping));
        }
    }
    properties
}

/// Body for creating `index`: configured analyzers plus mappings.
pub fn creation_body(index: &str, config: &SearchSyncConfig) -> Value {
    let mut body = json!({
        "mappings": { "properties": mapping_properties(index, config) }
    });
    if let Some(ref analysis) = config.analyzers {
        body["settings"] = json!({ "analysis": analysis });
    }
    body
}

/// Whether the index's current analysis settings contain every configured
/// analysis component unchanged.
///
/// Elasticsearch reports numbers and booleans in settings as strings, so
/// scalar leaves are compared by their text form.
pub fn analyzers_match(configured: &Value, current_settings: &Value) -> bool {
    let Some(configured) = configured.as_object() else {
        return true;
    };
    let current = current_settings.get("analysis");
    let current_entry = |section: &str, name: Option<&str>| {
        let section = current.and_then(|c| c.get(section));
        let entry = match name {
            Some(name) => section.and_then(|s| s.get(name)),
            None => section,
        };
        entry.map(settings_text)
    };

    configured.iter().all(|(section, entries)| {
        let Some(entries) = entries.as_object() else {
            return current_entry(section, None) == Some(settings_text(entries));
        };
        entries.iter().all(|(name, definition)| {
            current_entry(section, Some(name)) == Some(settings_text(definition))
        })
    })
}

/// Settings value with every number and boolean leaf rendered as a string.
fn settings_text(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(settings_text).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), settings_text(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
