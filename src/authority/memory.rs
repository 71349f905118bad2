//! In-Memory Authority
//!
//! Reference implementation of [`ItemAuthority`] that keeps items in a map.
//! Follows the authority's rules: parents must exist, creates without a
//! position append, deletes cascade, moves are cycle-checked and re-sequence
//! both the old and the new sibling group.
//!
//! Failures can be injected for exercising the sync engine's retry paths.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{now_millis, DomainError, DomainResult, Item, ItemDraft, ItemId, ItemPatch, RemoteId};

use super::ItemAuthority;

/// Journal entry for every call the authority received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    ListRoots,
    ListChildren(RemoteId),
    Create { parent_id: Option<RemoteId>, content: String },
    Update(RemoteId),
    Delete(RemoteId),
    Move { id: RemoteId, parent_id: Option<RemoteId>, position: Option<i32> },
}

#[derive(Debug)]
struct MemoryState {
    next_id: RemoteId,
    items: HashMap<RemoteId, Item>,
    fail_next: u32,
    offline: bool,
    /// Creates carrying this content are refused
    rejected_content: Option<String>,
    calls: Vec<AuthorityCall>,
}

impl MemoryState {
    /// Record the call, then decide whether it is allowed to succeed
    fn begin(&mut self, call: AuthorityCall) -> DomainResult<()> {
        self.calls.push(call);
        if self.offline {
            return Err(DomainError::Authority("authority unreachable".to_string()));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(DomainError::Authority("injected failure".to_string()));
        }
        if let (Some(AuthorityCall::Create { content, .. }), Some(rejected)) =
            (self.calls.last(), &self.rejected_content)
        {
            if content == rejected {
                return Err(DomainError::Authority(format!("create of {:?} refused", content)));
            }
        }
        Ok(())
    }

    fn children(&self, parent: Option<RemoteId>) -> Vec<Item> {
        let parent = parent.map(ItemId::Confirmed);
        let mut children: Vec<Item> = self
            .items
            .values()
            .filter(|item| item.parent_id == parent)
            .cloned()
            .collect();
        children.sort_by_key(|item| (item.position, item.id));
        children
    }

    fn get(&self, id: RemoteId) -> DomainResult<&Item> {
        self.items
            .get(&id)
            .ok_or(DomainError::NotFound(ItemId::Confirmed(id)))
    }

    fn require_parent(&self, id: ItemId, parent: Option<RemoteId>) -> DomainResult<()> {
        match parent {
            Some(parent) if !self.items.contains_key(&parent) => Err(DomainError::DanglingParent {
                id,
                parent: ItemId::Confirmed(parent),
            }),
            _ => Ok(()),
        }
    }

    fn reindex(&mut self, parent: Option<RemoteId>, skip: Option<RemoteId>) {
        let ids: Vec<RemoteId> = self
            .children(parent)
            .iter()
            .filter_map(|item| item.id.remote())
            .filter(|id| Some(*id) != skip)
            .collect();
        for (position, id) in ids.into_iter().enumerate() {
            if let Some(item) = self.items.get_mut(&id) {
                item.position = position as i32;
            }
        }
    }

    fn subtree_ids(&self, id: RemoteId) -> Vec<RemoteId> {
        let mut result = vec![id];
        let mut index = 0;
        while index < result.len() {
            let current = result[index];
            result.extend(self.children(Some(current)).iter().filter_map(|item| item.id.remote()));
            index += 1;
        }
        result
    }
}

/// Map-backed authority
#[derive(Debug)]
pub struct MemoryAuthority {
    state: Mutex<MemoryState>,
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthority {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Seed with existing items. Ids must be confirmed.
    pub fn with_items(items: Vec<Item>) -> Self {
        let items: HashMap<RemoteId, Item> = items
            .into_iter()
            .filter_map(|item| item.id.remote().map(|id| (id, item)))
            .collect();
        let next_id = items.keys().max().map_or(1, |max| max + 1);
        Self {
            state: Mutex::new(MemoryState {
                next_id,
                items,
                fail_next: 0,
                offline: false,
                rejected_content: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Make the next `count` calls fail
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.fail_next = count;
    }

    /// Fail every call until switched back
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Refuse creates whose content equals `content`; `None` accepts all again
    pub async fn reject_creates_of(&self, content: Option<&str>) {
        self.state.lock().await.rejected_content = content.map(str::to_string);
    }

    pub async fn calls(&self) -> Vec<AuthorityCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn get(&self, id: RemoteId) -> Option<Item> {
        self.state.lock().await.items.get(&id).cloned()
    }

    /// Every stored item, ordered by id
    pub async fn items(&self) -> Vec<Item> {
        let state = self.state.lock().await;
        let mut items: Vec<Item> = state.items.values().cloned().collect();
        items.sort_by_key(|item| item.id);
        items
    }
}

#[async_trait]
impl ItemAuthority for MemoryAuthority {
    async fn list_roots(&self) -> DomainResult<Vec<Item>> {
        let mut state = self.state.lock().await;
        state.begin(AuthorityCall::ListRoots)?;
        Ok(state.children(None))
    }

    async fn list_children(&self, parent_id: RemoteId) -> DomainResult<Vec<Item>> {
        let mut state = self.state.lock().await;
        state.begin(AuthorityCall::ListChildren(parent_id))?;
        state.get(parent_id)?;
        Ok(state.children(Some(parent_id)))
    }

    async fn create(&self, draft: &ItemDraft) -> DomainResult<Item> {
        let mut state = self.state.lock().await;
        state.begin(AuthorityCall::Create {
            parent_id: draft.parent_id,
            content: draft.content.clone(),
        })?;

        let id = state.next_id;
        state.require_parent(ItemId::Confirmed(id), draft.parent_id)?;
        state.next_id += 1;

        let position = draft
            .position
            .unwrap_or_else(|| state.children(draft.parent_id).len() as i32);
        let now = now_millis();
        let item = Item {
            id: ItemId::Confirmed(id),
            parent_id: draft.parent_id.map(ItemId::Confirmed),
            position,
            content: draft.content.clone(),
            notes: draft.notes.clone(),
            is_completed: draft.is_completed,
            is_expanded: draft.is_expanded,
            is_starred: draft.is_starred,
            tags: draft.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        state.items.insert(id, item.clone());
        Ok(item)
    }

    async fn update(&self, id: RemoteId, patch: &ItemPatch) -> DomainResult<Item> {
        let mut state = self.state.lock().await;
        state.begin(AuthorityCall::Update(id))?;
        let item = state
            .items
            .get_mut(&id)
            .ok_or(DomainError::NotFound(ItemId::Confirmed(id)))?;
        patch.apply_to(item);
        item.updated_at = now_millis();
        Ok(item.clone())
    }

    async fn delete(&self, id: RemoteId) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state.begin(AuthorityCall::Delete(id))?;
        let parent = state.get(id)?.parent_id.and_then(|parent| parent.remote());
        for doomed in state.subtree_ids(id) {
            state.items.remove(&doomed);
        }
        state.reindex(parent, None);
        Ok(())
    }

    async fn move_item(
        &self,
        id: RemoteId,
        parent_id: Option<RemoteId>,
        position: Option<i32>,
    ) -> DomainResult<Item> {
        let mut state = self.state.lock().await;
        state.begin(AuthorityCall::Move { id, parent_id, position })?;
        if let Some(position) = position.filter(|position| *position < 0) {
            return Err(DomainError::InvalidMove(format!("position {} for {}", position, id)));
        }

        let old_parent = state.get(id)?.parent_id.and_then(|parent| parent.remote());
        state.require_parent(ItemId::Confirmed(id), parent_id)?;

        // Validate no circular reference
        let mut cursor = parent_id;
        while let Some(current) = cursor {
            if current == id {
                return Err(DomainError::Cycle {
                    id: ItemId::Confirmed(id),
                    parent: ItemId::Confirmed(parent_id.unwrap_or(current)),
                });
            }
            cursor = state.get(current)?.parent_id.and_then(|parent| parent.remote());
        }

        if old_parent != parent_id {
            state.reindex(old_parent, Some(id));
        }

        let siblings: Vec<RemoteId> = state
            .children(parent_id)
            .iter()
            .filter_map(|item| item.id.remote())
            .filter(|sibling| *sibling != id)
            .collect();
        let target = match position {
            Some(position) if position >= 0 && (position as usize) <= siblings.len() => position,
            _ => siblings.len() as i32,
        };

        let mut slot = 0;
        for sibling in siblings {
            if slot == target {
                slot += 1;
            }
            if let Some(item) = state.items.get_mut(&sibling) {
                item.position = slot;
            }
            slot += 1;
        }

        let item = state
            .items
            .get_mut(&id)
            .ok_or(DomainError::NotFound(ItemId::Confirmed(id)))?;
        item.parent_id = parent_id.map(ItemId::Confirmed);
        item.position = target;
        item.updated_at = now_millis();
        Ok(item.clone())
    }
}
