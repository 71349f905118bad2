//! Tree Store
//!
//! Owns the in-memory collection of items, indexed by id and by parent.
//! It is the single source of truth renderers read from. The store does not
//! cascade: removing an item leaves its subtree to the mutation engine.
//!
//! Every mutating call publishes its events to all current subscribers
//! before it returns.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::domain::{DomainError, DomainResult, Item, ItemId};
use crate::mutation::ChangeSet;
use crate::tree;

/// Change notification sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The whole collection was replaced
    Replaced { count: usize },
    Inserted(ItemId),
    Updated(ItemId),
    Removed(ItemId),
    /// An id was substituted (temporary -> permanent)
    IdResolved { from: ItemId, to: ItemId },
}

/// In-memory item collection
#[derive(Debug, Default)]
pub struct TreeStore {
    items: HashMap<ItemId, Item>,
    /// parent -> child ids (unordered; ordering is by position)
    children: HashMap<Option<ItemId>, Vec<ItemId>>,
    subscribers: Vec<mpsc::UnboundedSender<StoreEvent>>,
    revision: u64,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================
    // Subscriptions
    // ========================

    /// Register a subscriber. Events are delivered in mutation order.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: StoreEvent) {
        self.revision += 1;
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Incremented on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ========================
    // Read Accessors
    // ========================

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of every item in display order (pre-order, by position).
    /// Mutating the returned items has no effect on the store.
    pub fn all(&self) -> Vec<Item> {
        let mut out = Vec::with_capacity(self.items.len());
        let mut stack: Vec<ItemId> = self.children(None).iter().rev().map(|item| item.id).collect();
        while let Some(id) = stack.pop() {
            if let Some(item) = self.items.get(&id) {
                out.push(item.clone());
                stack.extend(self.children(Some(id)).iter().rev().map(|child| child.id));
            }
        }
        out
    }

    /// Children of `parent` ordered by position (ties broken by id)
    pub fn children(&self, parent: Option<ItemId>) -> Vec<&Item> {
        let mut children: Vec<&Item> = self
            .children
            .get(&parent)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id)).collect())
            .unwrap_or_default();
        children.sort_by_key(|item| (item.position, item.id));
        children
    }

    pub fn roots(&self) -> Vec<&Item> {
        self.children(None)
    }

    // ========================
    // Mutations
    // ========================

    /// Replace the entire collection. The incoming forest is validated first;
    /// on error the previous contents are kept.
    pub fn replace_all(&mut self, items: Vec<Item>) -> DomainResult<()> {
        let mut by_id = HashMap::with_capacity(items.len());
        for item in items {
            let id = item.id;
            if by_id.insert(id, item).is_some() {
                return Err(DomainError::DuplicateId(id));
            }
        }
        for item in by_id.values() {
            if let Some(parent) = item.parent_id {
                if !by_id.contains_key(&parent) {
                    return Err(DomainError::DanglingParent { id: item.id, parent });
                }
            }
        }
        for item in by_id.values() {
            if let Some(parent) = item.parent_id {
                if tree::is_ancestor_in(&by_id, item.id, parent) {
                    return Err(DomainError::Cycle { id: item.id, parent });
                }
            }
        }

        self.items = by_id;
        self.rebuild_index();
        let count = self.items.len();
        log::debug!("store replaced with {} items", count);
        self.publish(StoreEvent::Replaced { count });
        Ok(())
    }

    /// Add one item. The id must be new and the parent must exist.
    pub fn insert(&mut self, item: Item) -> DomainResult<()> {
        if self.items.contains_key(&item.id) {
            return Err(DomainError::DuplicateId(item.id));
        }
        self.check_parent(&item)?;
        let id = item.id;
        self.insert_unchecked(item);
        self.publish(StoreEvent::Inserted(id));
        Ok(())
    }

    /// Replace the item stored under `item.id`, returning the previous value
    pub fn update(&mut self, item: Item) -> DomainResult<Item> {
        let previous = self.items.get(&item.id).ok_or(DomainError::NotFound(item.id))?;
        if previous.parent_id != item.parent_id {
            self.check_parent(&item)?;
            if let Some(parent) = item.parent_id {
                if parent == item.id || tree::is_ancestor_in(&self.items, item.id, parent) {
                    return Err(DomainError::Cycle { id: item.id, parent });
                }
            }
        }
        let id = item.id;
        let previous = self.replace_unchecked(item);
        self.publish(StoreEvent::Updated(id));
        Ok(previous)
    }

    /// Remove one item. Does not cascade.
    pub fn remove(&mut self, id: ItemId) -> DomainResult<Item> {
        let removed = self.remove_unchecked(id).ok_or(DomainError::NotFound(id))?;
        self.publish(StoreEvent::Removed(id));
        Ok(removed)
    }

    /// Swap an item's identity, migrating every child reference
    pub fn substitute_id(&mut self, from: ItemId, to: ItemId) -> DomainResult<()> {
        if from == to {
            return Ok(());
        }
        if self.items.contains_key(&to) {
            return Err(DomainError::DuplicateId(to));
        }
        let Some(mut item) = self.remove_unchecked(from) else {
            return Ok(());
        };
        item.id = to;
        self.insert_unchecked(item);

        if let Some(child_ids) = self.children.remove(&Some(from)) {
            for child_id in &child_ids {
                if let Some(child) = self.items.get_mut(child_id) {
                    child.parent_id = Some(to);
                }
            }
            self.children.insert(Some(to), child_ids);
        }
        self.publish(StoreEvent::IdResolved { from, to });
        Ok(())
    }

    /// Apply a whole change set. Preconditions are checked before anything is
    /// written, so a rejected change set leaves the store untouched.
    pub fn apply(&mut self, changes: &ChangeSet) -> DomainResult<()> {
        let removed: HashSet<ItemId> = changes.removed.iter().map(|item| item.id).collect();
        let mut incoming: HashSet<ItemId> = HashSet::new();
        for item in &changes.created {
            if self.items.contains_key(&item.id) || !incoming.insert(item.id) {
                return Err(DomainError::DuplicateId(item.id));
            }
            if let Some(parent) = item.parent_id {
                if !self.items.contains_key(&parent) && !incoming.contains(&parent) {
                    return Err(DomainError::DanglingParent { id: item.id, parent });
                }
            }
        }
        for change in &changes.updated {
            if !self.items.contains_key(&change.id()) {
                return Err(DomainError::NotFound(change.id()));
            }
            if let Some(parent) = change.after.parent_id {
                let exists = self.items.contains_key(&parent) || incoming.contains(&parent);
                if !exists || removed.contains(&parent) {
                    return Err(DomainError::DanglingParent { id: change.id(), parent });
                }
            }
        }
        for item in &changes.removed {
            if !self.items.contains_key(&item.id) {
                return Err(DomainError::NotFound(item.id));
            }
        }

        for item in &changes.created {
            self.insert_unchecked(item.clone());
            self.publish(StoreEvent::Inserted(item.id));
        }
        for change in &changes.updated {
            let Some(current) = self.items.get(&change.id()) else {
                continue;
            };
            let mut next = current.clone();
            if change.before.parent_id != change.after.parent_id {
                next.parent_id = change.after.parent_id;
            }
            if change.before.position != change.after.position {
                next.position = change.after.position;
            }
            change.before.diff(&change.after).apply_to(&mut next);
            next.updated_at = change.after.updated_at;
            self.replace_unchecked(next);
            self.publish(StoreEvent::Updated(change.id()));
        }
        for item in changes.removed.iter().rev() {
            self.remove_unchecked(item.id);
            self.publish(StoreEvent::Removed(item.id));
        }
        Ok(())
    }

    // ========================
    // Index Maintenance
    // ========================

    fn check_parent(&self, item: &Item) -> DomainResult<()> {
        match item.parent_id {
            Some(parent) if !self.items.contains_key(&parent) => {
                Err(DomainError::DanglingParent { id: item.id, parent })
            }
            _ => Ok(()),
        }
    }

    fn rebuild_index(&mut self) {
        self.children.clear();
        for item in self.items.values() {
            self.children.entry(item.parent_id).or_default().push(item.id);
        }
    }

    fn insert_unchecked(&mut self, item: Item) {
        self.children.entry(item.parent_id).or_default().push(item.id);
        self.items.insert(item.id, item);
    }

    fn replace_unchecked(&mut self, item: Item) -> Item {
        let previous = self.remove_unchecked(item.id);
        self.insert_unchecked(item.clone());
        previous.unwrap_or(item)
    }

    fn remove_unchecked(&mut self, id: ItemId) -> Option<Item> {
        let item = self.items.remove(&id)?;
        if let Some(siblings) = self.children.get_mut(&item.parent_id) {
            siblings.retain(|sibling| *sibling != id);
            if siblings.is_empty() {
                self.children.remove(&item.parent_id);
            }
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(id: i64, position: i32) -> Item {
        Item::new_root(ItemId::Confirmed(id), position).with_content(format!("Item {}", id))
    }

    fn child(id: i64, parent: i64, position: i32) -> Item {
        Item::new_child(ItemId::Confirmed(id), ItemId::Confirmed(parent), position)
    }

    fn c(id: i64) -> ItemId {
        ItemId::Confirmed(id)
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = TreeStore::new();
        store.insert(root(1, 0)).unwrap();
        store.insert(child(2, 1, 0)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(c(2)).unwrap().parent_id, Some(c(1)));
        assert_eq!(store.children(Some(c(1))).len(), 1);
    }

    #[test]
    fn test_insert_rejects_duplicates_and_dangling_parents() {
        let mut store = TreeStore::new();
        store.insert(root(1, 0)).unwrap();

        assert_eq!(store.insert(root(1, 1)), Err(DomainError::DuplicateId(c(1))));
        assert_eq!(
            store.insert(child(2, 99, 0)),
            Err(DomainError::DanglingParent { id: c(2), parent: c(99) })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_missing_is_error() {
        let mut store = TreeStore::new();
        assert_eq!(store.update(root(5, 0)), Err(DomainError::NotFound(c(5))));
    }

    #[test]
    fn test_update_rejects_cycle() {
        let mut store = TreeStore::new();
        store.insert(root(1, 0)).unwrap();
        store.insert(child(2, 1, 0)).unwrap();

        let mut one = store.get(c(1)).unwrap().clone();
        one.parent_id = Some(c(2));
        assert_eq!(store.update(one), Err(DomainError::Cycle { id: c(1), parent: c(2) }));
    }

    #[test]
    fn test_remove_does_not_cascade() {
        let mut store = TreeStore::new();
        store.insert(root(1, 0)).unwrap();
        store.insert(child(2, 1, 0)).unwrap();

        store.remove(c(1)).unwrap();
        assert!(!store.contains(c(1)));
        assert!(store.contains(c(2)));
    }

    #[test]
    fn test_replace_all_validates_forest() {
        let mut store = TreeStore::new();
        store.replace_all(vec![root(1, 0)]).unwrap();

        let mut a = root(10, 0);
        let mut b = root(11, 0);
        a.parent_id = Some(c(11));
        b.parent_id = Some(c(10));
        assert!(matches!(store.replace_all(vec![a, b]), Err(DomainError::Cycle { .. })));
        assert!(matches!(
            store.replace_all(vec![child(3, 42, 0)]),
            Err(DomainError::DanglingParent { .. })
        ));
        assert_eq!(store.replace_all(vec![root(4, 0), root(4, 1)]), Err(DomainError::DuplicateId(c(4))));

        // previous contents survive every rejected replace
        assert!(store.contains(c(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_all_is_display_order_snapshot() {
        let mut store = TreeStore::new();
        store
            .replace_all(vec![root(2, 1), child(3, 1, 0), root(1, 0), child(4, 3, 0)])
            .unwrap();

        let ids: Vec<ItemId> = store.all().iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![c(1), c(3), c(4), c(2)]);

        let mut snapshot = store.all();
        snapshot[0].content = "changed".to_string();
        assert_eq!(store.get(c(1)).unwrap().content, "Item 1");
    }

    #[test]
    fn test_substitute_id_migrates_children() {
        let mut store = TreeStore::new();
        store.insert(Item::new_root(ItemId::Pending(1), 0)).unwrap();
        store
            .insert(Item::new_child(ItemId::Pending(2), ItemId::Pending(1), 0))
            .unwrap();

        store.substitute_id(ItemId::Pending(1), c(100)).unwrap();

        assert!(!store.contains(ItemId::Pending(1)));
        assert!(store.contains(c(100)));
        assert_eq!(store.get(ItemId::Pending(2)).unwrap().parent_id, Some(c(100)));
        assert_eq!(store.children(Some(c(100))).len(), 1);
    }

    #[test]
    fn test_subscribers_see_events_before_return() {
        let mut store = TreeStore::new();
        let mut rx = store.subscribe();

        store.insert(root(1, 0)).unwrap();
        let mut one = store.get(c(1)).unwrap().clone();
        one.content = "edited".to_string();
        store.update(one).unwrap();
        store.remove(c(1)).unwrap();

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Inserted(c(1)));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Updated(c(1)));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Removed(c(1)));
        assert!(rx.try_recv().is_err());
        assert_eq!(store.revision(), 3);
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut store = TreeStore::new();
        drop(store.subscribe());
        let mut live = store.subscribe();
        store.insert(root(1, 0)).unwrap();
        assert_eq!(store.subscribers.len(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn test_apply_rejects_without_partial_writes() {
        let mut store = TreeStore::new();
        store.insert(root(1, 0)).unwrap();

        let changes = ChangeSet {
            created: vec![root(2, 1)],
            updated: Vec::new(),
            removed: vec![root(99, 0)],
        };
        assert_eq!(store.apply(&changes), Err(DomainError::NotFound(c(99))));
        assert!(!store.contains(c(2)));
    }
}
