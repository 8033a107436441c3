// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity data structure.
//!
//! An [`Entity`] is owned by the system of record. The sync layer only reads
//! it, except for assigning an identifier when the system of record did not.
//!
//! # Example
//!
//! ```
//! use search_sync::{Entity, EntityCanon};
//! use serde_json::json;
//!
//! let entity = Entity::new(EntityCanon::new("foo"))
//!     .with_id("john doe")
//!     .with_attr("jobTitle", json!("important sounding title"));
//!
//! assert_eq!(entity.type_name(), "foo");
//! assert_eq!(entity.snapshot()["id"], "john doe");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identifier attribute in snapshots and search documents.
pub const ID_FIELD: &str = "id";

/// Name of the type discriminator attribute carried by every search document.
pub const TYPE_FIELD: &str = "entity$";

/// Provenance triple of an entity: optional zone and base, mandatory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityCanon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    pub name: String,
}

impl EntityCanon {
    /// Canon with neither zone nor base.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            zone: None,
            base: None,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    #[must_use]
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Parse a `zone/base/name` canon string. `-` or an empty segment means absent.
    ///
    /// A bare `name` (no slashes) is accepted as well.
    ///
    /// ```
    /// use search_sync::EntityCanon;
    ///
    /// let canon = EntityCanon::parse("-/sys/user").unwrap();
    /// assert_eq!(canon.type_name(), "sys_user");
    /// assert_eq!(EntityCanon::parse("foo").unwrap().type_name(), "foo");
    /// assert!(EntityCanon::parse("a/b/-").is_none());
    /// ```
    pub fn parse(canon: &str) -> Option<Self> {
        let segment = |s: &str| {
            let s = s.trim();
            (!s.is_empty() && s != "-").then(|| s.to_string())
        };

        let parts: Vec<&str> = canon.split('/').collect();
        let (zone, base, name) = match parts.as_slice() {
            [name] => (None, None, segment(name)?),
            [base, name] => (None, segment(base), segment(name)?),
            [zone, base, name] => (segment(zone), segment(base), segment(name)?),
            _ => return None,
        };

        Some(Self { zone, base, name })
    }

    /// Canonical type name: non-empty zone and base segments joined with the name by `_`.
    pub fn type_name(&self) -> String {
        [self.zone.as_deref(), self.base.as_deref(), Some(self.name.as_str())]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl std::fmt::Display for EntityCanon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.zone.as_deref().unwrap_or("-"),
            self.base.as_deref().unwrap_or("-"),
            self.name
        )
    }
}

/// A domain entity as seen by the sync layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Persisted identifier; `None` until the entity is first saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub canon: EntityCanon,
    /// All attributes except the identifier.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(canon: EntityCanon) -> Self {
        Self {
            id: None,
            canon,
            attributes: Map::new(),
        }
    }

    /// Build an entity from a flat snapshot. A string or numeric `id` attribute
    /// becomes the identifier; the discriminator attribute is dropped.
    pub fn from_snapshot(canon: EntityCanon, mut snapshot: Map<String, Value>) -> Self {
        let id = match snapshot.remove(ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        snapshot.remove(TYPE_FIELD);

        Self {
            id,
            canon,
            attributes: snapshot,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Canonical type name of this entity.
    pub fn type_name(&self) -> String {
        self.canon.type_name()
    }

    /// Identifier if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Flat view of all attributes, including `id` when assigned.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut snapshot = self.attributes.clone();
        if let Some(id) = self.id() {
            snapshot.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        }
        snapshot
    }
}
