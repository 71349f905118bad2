//! Remote Item Authority
//!
//! Defines the abstract interface to whatever assigns permanent ids and
//! stores items remotely. Implementations can be HTTP, a database, or the
//! in-memory [`MemoryAuthority`].

mod memory;

use async_trait::async_trait;

use crate::domain::{DomainResult, Item, ItemDraft, ItemPatch, RemoteId};

pub use memory::{AuthorityCall, MemoryAuthority};

/// Core authority trait
///
/// All operations are async and may fail; every returned item carries a
/// confirmed id.
#[async_trait]
pub trait ItemAuthority: Send + Sync {
    /// Root items ordered by position
    async fn list_roots(&self) -> DomainResult<Vec<Item>>;

    /// Children of a parent ordered by position
    async fn list_children(&self, parent_id: RemoteId) -> DomainResult<Vec<Item>>;

    /// Create an item and assign its permanent id
    async fn create(&self, draft: &ItemDraft) -> DomainResult<Item>;

    /// Update non-structural fields
    async fn update(&self, id: RemoteId, patch: &ItemPatch) -> DomainResult<Item>;

    /// Delete an item and its subtree
    async fn delete(&self, id: RemoteId) -> DomainResult<()>;

    /// Reparent and/or reposition an item
    async fn move_item(
        &self,
        id: RemoteId,
        parent_id: Option<RemoteId>,
        position: Option<i32>,
    ) -> DomainResult<Item>;
}
