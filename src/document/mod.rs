// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity → search document shaping.
//!
//! ```text
//! Entity snapshot
//!     ├─→ SaveFilter      skip records that must never be searchable
//!     ├─→ project()       allow-listed fields + id + entity$
//!     └─→ resolve_id()    document id == entity id, generated once if absent
//! ```

mod filter;
mod identity;
mod projector;

pub use filter::SaveFilter;
pub use identity::{generate_id, resolve_id};
pub use projector::{project, stamp_discriminator};
