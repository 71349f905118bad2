//! Domain Layer
//!
//! Contains all domain entities and core abstractions.
//! This layer has no async or I/O dependencies (serde, thiserror and chrono only).

mod entity;
mod item;

pub use entity::{DomainError, DomainResult, Entity};
pub use item::{now_millis, Item, ItemDraft, ItemId, ItemPatch, LocalId, RemoteId};
