//! Domain Layer - Core Entity Trait
//!
//! This trait defines the basic contract for all domain entities.
//! All entities must have a unique ID and be thread-safe.

use thiserror::Error;

use super::ItemId;

/// Core trait for all domain entities
pub trait Entity: Sized + Send + Sync + Clone {
    /// The type of the entity's unique identifier
    type Id: Copy + Eq + std::hash::Hash + Send + Sync;

    /// Returns the entity's unique identifier
    fn id(&self) -> Self::Id;
}

/// Common result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// No item with this id in the store.
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// Insert of an id that is already present.
    #[error("item already exists: {0}")]
    DuplicateId(ItemId),

    /// `parent_id` points at an item that does not exist.
    #[error("item {id} references missing parent {parent}")]
    DanglingParent { id: ItemId, parent: ItemId },

    /// Reparenting would make the item its own ancestor.
    #[error("moving {id} under {parent} would create a cycle")]
    Cycle { id: ItemId, parent: ItemId },

    /// Structurally invalid move, such as a negative target position.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// The remote authority rejected or failed an operation.
    #[error("authority error: {0}")]
    Authority(String),

    /// The sync worker is no longer running.
    #[error("sync engine shut down")]
    SyncShutdown,
}
