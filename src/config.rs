//! Configuration for the search sync layer.
//!
//! Loaded once at startup and read-only afterwards.
//!
//! # Example
//!
//! ```
//! use search_sync::SearchSyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SearchSyncConfig::default();
//! assert_eq!(config.connection.url, "http://localhost:9200");
//! assert_eq!(config.default_fields, vec!["id^3", "name^2", "*"]);
//!
//! // From JSON
//! let config = SearchSyncConfig::from_json(r#"{
//!     "default_index": "people",
//!     "refresh_on_save": true,
//!     "entities": {
//!         "sys_user": { "fields": ["name", { "name": "bio", "priority": 2, "analyzer": "english" }] }
//!     },
//!     "save_filters": {
//!         "foo": { "status": "draft" }
//!     }
//! }"#).unwrap();
//! assert_eq!(config.default_index, "people");
//! assert_eq!(config.entities["sys_user"].fields.len(), 2);
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::storage::traits::SearchError;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSyncConfig {
    /// Search backend connection
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Index used when a request names none
    #[serde(default = "default_index")]
    pub default_index: String,

    /// Refresh the index after every write so it is visible to the next search
    #[serde(default)]
    pub refresh_on_save: bool,

    /// Field weights registered by `create-index` when no field list is given
    #[serde(default = "default_fields")]
    pub default_fields: Vec<String>,

    /// Per-entity-type field allow-lists, keyed by canonical type name.
    /// A type without an entry projects all of its attributes.
    #[serde(default)]
    pub entities: HashMap<String, EntityFieldConfig>,

    /// Save-skip filters keyed by canonical type name
    #[serde(default)]
    pub save_filters: HashMap<String, HashMap<String, FilterPredicate>>,

    /// Custom analysis settings (`{ "analyzer": { ... }, "filter": { ... } }`)
    #[serde(default)]
    pub analyzers: Option<Value>,

    /// Replace search hits with authoritative records from the system of record
    #[serde(default)]
    pub rehydrate: bool,
}

/// Search backend connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the search engine
    #[serde(default = "default_url")]
    pub url: String,

    /// Connectivity probe timeout before first use
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Per-request timeout enforced by the HTTP client
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// API key auth, preferred over basic auth when both are set
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Field configuration of one entity type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityFieldConfig {
    /// Target index (defaults to `default_index`)
    #[serde(default)]
    pub index: Option<String>,

    /// Ordered allow-list of projected attributes
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl EntityFieldConfig {
    /// Whether `field` is in the allow-list.
    pub fn allows(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.name() == field)
    }
}

/// An allowed field: either a bare name or a name with weighting and mapping hints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        priority: Option<u32>,
        #[serde(default)]
        analyzer: Option<String>,
        /// Mapping type hint (e.g. `text`, `keyword`, `date`)
        #[serde(default, rename = "type")]
        field_type: Option<String>,
    },
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Name(name) => name,
            FieldSpec::Detailed { name, .. } => name,
        }
    }

    pub fn priority(&self) -> Option<u32> {
        match self {
            FieldSpec::Name(_) => None,
            FieldSpec::Detailed { priority, .. } => *priority,
        }
    }

    pub fn analyzer(&self) -> Option<&str> {
        match self {
            FieldSpec::Name(_) => None,
            FieldSpec::Detailed { analyzer, .. } => analyzer.as_deref(),
        }
    }

    pub fn field_type(&self) -> Option<&str> {
        match self {
            FieldSpec::Name(_) => None,
            FieldSpec::Detailed { field_type, .. } => field_type.as_deref(),
        }
    }
}

/// One predicate of a save-skip filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterPredicate {
    /// Regex matched against the attribute's string form
    Pattern { pattern: String },
    /// Exact JSON equality
    Value(Value),
}

fn default_index() -> String { "search".to_string() }
fn default_fields() -> Vec<String> { vec!["id^3".into(), "name^2".into(), "*".into()] }
fn default_url() -> String { "http://localhost:9200".to_string() }
fn default_ping_timeout_ms() -> u64 { 3_000 }
fn default_request_timeout_ms() -> u64 { 30_000 }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ping_timeout_ms: default_ping_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            username: None,
            password: None,
            api_key: None,
        }
    }
}

impl Default for SearchSyncConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            default_index: default_index(),
            refresh_on_save: false,
            default_fields: default_fields(),
            entities: HashMap::new(),
            save_filters: HashMap::new(),
            analyzers: None,
            rehydrate: false,
        }
    }
}

impl SearchSyncConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        serde_json::from_str(json)
            .map_err(|e| SearchError::Validation(format!("Invalid configuration: {}", e)))
    }

    /// Field configuration for an entity type, if any.
    pub fn entity(&self, type_name: &str) -> Option<&EntityFieldConfig> {
        self.entities.get(type_name)
    }

    /// Index that documents of `type_name` are written to.
    pub fn index_for(&self, type_name: &str) -> &str {
        self.entities
            .get(type_name)
            .and_then(|e| e.index.as_deref())
            .unwrap_or(&self.default_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = SearchSyncConfig::from_json("{}").unwrap();
        assert_eq!(config.default_index, "search");
        assert!(!config.refresh_on_save);
        assert!(!config.rehydrate);
        assert_eq!(config.connection.ping_timeout_ms, 3_000);
        assert!(config.entities.is_empty());
    }

    #[test]
    fn test_field_spec_forms() {
        let config = SearchSyncConfig::from_json(r#"{
            "entities": {
                "foo": {
                    "index": "foos",
                    "fields": ["a", {"name": "b", "priority": 3, "type": "keyword"}]
                }
            }
        }"#).unwrap();

        let foo = config.entity("foo").unwrap();
        assert_eq!(foo.fields[0], FieldSpec::Name("a".into()));
        assert_eq!(foo.fields[1].name(), "b");
        assert_eq!(foo.fields[1].priority(), Some(3));
        assert_eq!(foo.fields[1].field_type(), Some("keyword"));
        assert!(foo.allows("a"));
        assert!(!foo.allows("c"));
        assert_eq!(config.index_for("foo"), "foos");
        assert_eq!(config.index_for("bar"), "search");
    }

    #[test]
    fn test_filter_predicate_forms() {
        let config = SearchSyncConfig::from_json(r#"{
            "save_filters": {
                "foo": { "status": "draft", "title": {"pattern": "^tmp"}, "n": 3 }
            }
        }"#).unwrap();

        let filter = &config.save_filters["foo"];
        assert_eq!(filter["status"], FilterPredicate::Value(json!("draft")));
        assert_eq!(filter["title"], FilterPredicate::Pattern { pattern: "^tmp".into() });
        assert_eq!(filter["n"], FilterPredicate::Value(json!(3)));
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = SearchSyncConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }
}
