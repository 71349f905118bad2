//! Item Entity
//!
//! Represents one outline bullet with hierarchical structure (single parent).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// Identifier assigned by the remote authority
pub type RemoteId = i64;

/// Identifier minted locally before the authority has answered
pub type LocalId = u64;

/// Item identity.
///
/// An item starts `Pending` when created locally and becomes `Confirmed` once
/// the authority returns its permanent id. The two spaces never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ItemId {
    Pending(LocalId),
    Confirmed(RemoteId),
}

impl ItemId {
    pub fn is_pending(&self) -> bool {
        matches!(self, ItemId::Pending(_))
    }

    /// The permanent id, if the authority has assigned one
    pub fn remote(&self) -> Option<RemoteId> {
        match self {
            ItemId::Confirmed(id) => Some(*id),
            ItemId::Pending(_) => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Pending(local) => write!(f, "~{}", local),
            ItemId::Confirmed(remote) => write!(f, "{}", remote),
        }
    }
}

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// An outline item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique identifier
    pub id: ItemId,
    /// Parent item ID (None = root level)
    pub parent_id: Option<ItemId>,
    /// Position within siblings (for ordering)
    pub position: i32,
    /// Bullet text
    pub content: String,
    /// Free-form notes attached to the bullet
    pub notes: String,
    pub is_completed: bool,
    /// Whether children are shown
    pub is_expanded: bool,
    pub is_starred: bool,
    /// Maintained by the tag indexer, not authoritative here
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    /// Create a new root item with default values
    pub fn new_root(id: ItemId, position: i32) -> Self {
        let now = now_millis();
        Self {
            id,
            parent_id: None,
            position,
            content: String::new(),
            notes: String::new(),
            is_completed: false,
            is_expanded: true,
            is_starred: false,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new child item under a parent
    pub fn new_child(id: ItemId, parent_id: ItemId, position: i32) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::new_root(id, position)
        }
    }

    /// Builder-style content setter
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Check if this is a root item (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    /// Build the payload sent to the authority on create
    pub fn to_draft(&self, parent_id: Option<RemoteId>) -> ItemDraft {
        ItemDraft {
            parent_id,
            position: Some(self.position),
            content: self.content.clone(),
            notes: self.notes.clone(),
            is_completed: self.is_completed,
            is_expanded: self.is_expanded,
            is_starred: self.is_starred,
            tags: self.tags.clone(),
        }
    }

    /// Fields whose value differs between `self` and `other`, carrying `other`'s values.
    /// Structural fields (parent, position) are not part of a patch.
    pub fn diff(&self, other: &Item) -> ItemPatch {
        ItemPatch {
            content: (self.content != other.content).then(|| other.content.clone()),
            notes: (self.notes != other.notes).then(|| other.notes.clone()),
            is_completed: (self.is_completed != other.is_completed).then_some(other.is_completed),
            is_expanded: (self.is_expanded != other.is_expanded).then_some(other.is_expanded),
            is_starred: (self.is_starred != other.is_starred).then_some(other.is_starred),
            tags: (self.tags != other.tags).then(|| other.tags.clone()),
        }
    }

    /// Whether parent or position differ
    pub fn placement_differs(&self, other: &Item) -> bool {
        self.parent_id != other.parent_id || self.position != other.position
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Create payload for the authority. The parent is already a permanent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub parent_id: Option<RemoteId>,
    /// None lets the authority append at the end of the sibling group
    pub position: Option<i32>,
    pub content: String,
    pub notes: String,
    pub is_completed: bool,
    pub is_expanded: bool,
    pub is_starred: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Partial update of an item's non-structural fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.notes.is_none()
            && self.is_completed.is_none()
            && self.is_expanded.is_none()
            && self.is_starred.is_none()
            && self.tags.is_none()
    }

    /// Write every present field onto `item`
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(content) = &self.content {
            item.content = content.clone();
        }
        if let Some(notes) = &self.notes {
            item.notes = notes.clone();
        }
        if let Some(completed) = self.is_completed {
            item.is_completed = completed;
        }
        if let Some(expanded) = self.is_expanded {
            item.is_expanded = expanded;
        }
        if let Some(starred) = self.is_starred {
            item.is_starred = starred;
        }
        if let Some(tags) = &self.tags {
            item.tags = tags.clone();
        }
    }
}
