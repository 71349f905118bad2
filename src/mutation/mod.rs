//! Ordering/Mutation Engine
//!
//! Pure operations over a [`TreeStore`] snapshot. Each operation returns a
//! [`ChangeSet`] describing the full effect (including sibling re-sequencing)
//! without touching the store; the caller records it and applies it.
//!
//! Operations are split by concern:
//! - item_positioning: creation and ordering within a sibling group
//! - item_hierarchy: reparenting, cascading delete and completion
//! - item_attributes: content, notes and display flags

mod change_set;
mod item_attributes;
mod item_hierarchy;
mod item_positioning;

use std::collections::{HashMap, HashSet};

use crate::domain::{now_millis, DomainError, DomainResult, Item, ItemId};
use crate::store::TreeStore;

pub use change_set::{ChangeSet, ItemChange};
pub use item_attributes::{toggle_expanded, toggle_starred, update_content, update_notes};
pub use item_hierarchy::{delete, drag_move, indent, outdent, set_completed};
pub use item_positioning::{
    create_child, create_root, create_sibling_after, duplicate, move_down, move_up,
};

/// Working copy layered over the store while an operation is computed
struct Plan<'a> {
    store: &'a TreeStore,
    created: Vec<Item>,
    touched: HashMap<ItemId, Item>,
    touched_order: Vec<ItemId>,
    removed: Vec<Item>,
    removed_ids: HashSet<ItemId>,
}

impl<'a> Plan<'a> {
    fn new(store: &'a TreeStore) -> Self {
        Self {
            store,
            created: Vec::new(),
            touched: HashMap::new(),
            touched_order: Vec::new(),
            removed: Vec::new(),
            removed_ids: HashSet::new(),
        }
    }

    /// Current state of an item, including planned edits
    fn item(&self, id: ItemId) -> DomainResult<Item> {
        if self.removed_ids.contains(&id) {
            return Err(DomainError::NotFound(id));
        }
        if let Some(item) = self.created.iter().find(|item| item.id == id) {
            return Ok(item.clone());
        }
        if let Some(item) = self.touched.get(&id) {
            return Ok(item.clone());
        }
        self.store.get(id).cloned().ok_or(DomainError::NotFound(id))
    }

    fn set(&mut self, item: Item) {
        if let Some(created) = self.created.iter_mut().find(|created| created.id == item.id) {
            *created = item;
            return;
        }
        if !self.touched.contains_key(&item.id) {
            self.touched_order.push(item.id);
        }
        self.touched.insert(item.id, item);
    }

    fn create(&mut self, item: Item) {
        self.created.push(item);
    }

    fn remove(&mut self, item: Item) {
        if self.removed_ids.insert(item.id) {
            self.removed.push(item);
        }
    }

    /// Members of a sibling group, ordered by (position, id)
    fn siblings(&self, parent: Option<ItemId>) -> Vec<Item> {
        let mut ids: Vec<ItemId> = self.store.children(parent).iter().map(|item| item.id).collect();
        ids.extend(self.touched.keys().copied());
        ids.extend(self.created.iter().map(|item| item.id));
        ids.sort();
        ids.dedup();

        let mut group: Vec<Item> = ids
            .into_iter()
            .filter_map(|id| self.item(id).ok())
            .filter(|item| item.parent_id == parent)
            .collect();
        group.sort_by_key(|item| (item.position, item.id));
        group
    }

    /// Push every sibling at or after `from` one slot down
    fn shift_from(&mut self, parent: Option<ItemId>, from: i32, except: Option<ItemId>) {
        for mut sibling in self.siblings(parent) {
            if Some(sibling.id) != except && sibling.position >= from {
                sibling.position += 1;
                self.set(sibling);
            }
        }
    }

    /// Renumber a sibling group to 0..n, keeping its order
    fn reindex(&mut self, parent: Option<ItemId>) {
        for (index, mut sibling) in self.siblings(parent).into_iter().enumerate() {
            let position = index as i32;
            if sibling.position != position {
                sibling.position = position;
                self.set(sibling);
            }
        }
    }

    fn finish(self) -> ChangeSet {
        let now = now_millis();
        let mut updated = Vec::new();
        for id in &self.touched_order {
            let (Some(before), Some(after)) = (self.store.get(*id), self.touched.get(id)) else {
                continue;
            };
            let mut after = after.clone();
            after.updated_at = before.updated_at;
            if *before == after {
                continue;
            }
            after.updated_at = now;
            updated.push(ItemChange {
                before: before.clone(),
                after,
            });
        }
        let created = self
            .created
            .into_iter()
            .map(|mut item| {
                item.updated_at = now;
                item
            })
            .collect();
        ChangeSet {
            created,
            updated,
            removed: self.removed,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::{Item, ItemId};
    use crate::store::TreeStore;

    use super::ChangeSet;

    pub fn c(id: i64) -> ItemId {
        ItemId::Confirmed(id)
    }

    pub fn root(id: i64, position: i32) -> Item {
        Item::new_root(c(id), position).with_content(format!("Item {}", id))
    }

    pub fn child(id: i64, parent: i64, position: i32) -> Item {
        Item::new_child(c(id), c(parent), position).with_content(format!("Item {}", id))
    }

    pub fn store_with(items: Vec<Item>) -> TreeStore {
        let mut store = TreeStore::new();
        store.replace_all(items).unwrap();
        store
    }

    pub fn apply(store: &mut TreeStore, changes: ChangeSet) {
        store.apply(&changes).unwrap();
        assert_contiguous(store);
    }

    /// Ids of a sibling group in display order
    pub fn order(store: &TreeStore, parent: Option<i64>) -> Vec<ItemId> {
        store.children(parent.map(c)).iter().map(|item| item.id).collect()
    }

    /// Every sibling group holds positions 0..n without gaps or duplicates
    pub fn assert_contiguous(store: &TreeStore) {
        let mut parents: Vec<Option<ItemId>> = vec![None];
        parents.extend(store.all().iter().map(|item| Some(item.id)));
        for parent in parents {
            let positions: Vec<i32> = store.children(parent).iter().map(|item| item.position).collect();
            let expected: Vec<i32> = (0..positions.len() as i32).collect();
            assert_eq!(positions, expected, "sibling group under {:?}", parent);
        }
    }
}
