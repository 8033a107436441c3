// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document identity.

use crate::entity::Entity;

/// Generate a fresh 128-bit opaque identifier (UUID v4, simple form).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Resolve the document id of an entity.
///
/// An entity that already carries a non-empty id keeps it. Otherwise a new id
/// is generated and assigned onto the entity, so it is never regenerated.
///
/// ```
/// use search_sync::{Entity, EntityCanon};
/// use search_sync::document::resolve_id;
///
/// let mut entity = Entity::new(EntityCanon::new("foo"));
/// let first = resolve_id(&mut entity);
/// assert_eq!(entity.id(), Some(first.as_str()));
/// assert_eq!(resolve_id(&mut entity), first);
/// ```
pub fn resolve_id(entity: &mut Entity) -> String {
    if let Some(id) = entity.id() {
        return id.to_string();
    }
    let id = generate_id();
    entity.id = Some(id.clone());
    id
}
