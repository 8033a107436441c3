// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document projection.

use serde_json::{Map, Value};

use crate::config::EntityFieldConfig;
use crate::entity::{ID_FIELD, TYPE_FIELD};

/// Project an entity snapshot into a search document body.
///
/// Without a field configuration the snapshot is returned unchanged. With one,
/// only allow-listed attributes survive, plus `id` (when present) and the
/// `entity$` discriminator, whether or not the allow-list names them.
///
/// ```
/// use search_sync::config::{EntityFieldConfig, FieldSpec};
/// use search_sync::document::project;
/// use serde_json::json;
///
/// let config = EntityFieldConfig {
///     index: None,
///     fields: vec![FieldSpec::Name("a".into()), FieldSpec::Name("b".into())],
/// };
/// let snapshot = json!({"id": "1", "a": 1, "b": 2, "c": 3});
/// let doc = project("foo", snapshot.as_object().unwrap(), Some(&config));
///
/// assert_eq!(doc, *json!({"id": "1", "a": 1, "b": 2, "entity$": "foo"}).as_object().unwrap());
/// ```
pub fn project(
    entity_type: &str,
    snapshot: &Map<String, Value>,
    config: Option<&EntityFieldConfig>,
) -> Map<String, Value> {
    let Some(config) = config else {
        return snapshot.clone();
    };

    let mut doc: Map<String, Value> = config
        .fields
        .iter()
        .filter_map(|field| {
            snapshot
                .get(field.name())
                .map(|value| (field.name().to_string(), value.clone()))
        })
        .collect();

    if let Some(id) = snapshot.get(ID_FIELD) {
        doc.insert(ID_FIELD.to_string(), id.clone());
    }
    stamp_discriminator(&mut doc, entity_type);
    doc
}

/// Set the `entity$` discriminator on a document body.
pub fn stamp_discriminator(doc: &mut Map<String, Value>, entity_type: &str) {
    doc.insert(TYPE_FIELD.to_string(), Value::String(entity_type.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSpec;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn allow(names: &[&str]) -> EntityFieldConfig {
        EntityFieldConfig {
            index: None,
            fields: names.iter().map(|n| FieldSpec::Name(n.to_string())).collect(),
        }
    }

    #[test]
    fn test_no_config_projects_everything() {
        let snapshot = obj(json!({"id": "1", "a": 1, "nested": {"x": true}}));
        assert_eq!(project("foo", &snapshot, None), snapshot);
    }

    #[test]
    fn test_allow_list_keeps_id_and_discriminator() {
        let snapshot = obj(json!({"id": "1", "a": 1, "b": 2, "c": 3}));
        let doc = project("foo", &snapshot, Some(&allow(&["a", "b"])));

        let mut keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "entity$", "id"]);
        assert_eq!(doc["entity$"], "foo");
    }

    #[test]
    fn test_missing_allowed_fields_are_skipped() {
        let snapshot = obj(json!({"a": 1}));
        let doc = project("foo", &snapshot, Some(&allow(&["a", "zzz"])));
        assert_eq!(doc, obj(json!({"a": 1, "entity$": "foo"})));
    }

    #[test]
    fn test_discriminator_overrides_snapshot_value() {
        let snapshot = obj(json!({"entity$": "spoofed", "a": 1}));
        let doc = project("foo", &snapshot, Some(&allow(&["a", "entity$"])));
        assert_eq!(doc["entity$"], "foo");
    }
}
