//! Change Sets
//!
//! The unit every mutation produces: which items were created, which were
//! updated (with their state before and after) and which were removed.
//! A change set is invertible, which is what the action log relies on.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Item, ItemId};

/// Before/after pair for one updated item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub before: Item,
    pub after: Item,
}

impl ItemChange {
    pub fn id(&self) -> ItemId {
        self.after.id
    }
}

/// Result of one logical mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Inserted items, parents before children
    pub created: Vec<Item>,
    pub updated: Vec<ItemChange>,
    /// Removed items in pre-order (parents before children)
    pub removed: Vec<Item>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// The change set that undoes this one
    pub fn inverse(&self) -> ChangeSet {
        ChangeSet {
            created: self.removed.clone(),
            updated: self
                .updated
                .iter()
                .map(|change| ItemChange {
                    before: change.after.clone(),
                    after: change.before.clone(),
                })
                .collect(),
            removed: self.created.clone(),
        }
    }

    /// The part of this change set that concerns `ids`, order kept
    pub fn restricted_to(&self, ids: &HashSet<ItemId>) -> ChangeSet {
        ChangeSet {
            created: self
                .created
                .iter()
                .filter(|item| ids.contains(&item.id))
                .cloned()
                .collect(),
            updated: self
                .updated
                .iter()
                .filter(|change| ids.contains(&change.id()))
                .cloned()
                .collect(),
            removed: self
                .removed
                .iter()
                .filter(|item| ids.contains(&item.id))
                .cloned()
                .collect(),
        }
    }

    pub fn created_item(&self, id: ItemId) -> Option<&Item> {
        self.created.iter().find(|item| item.id == id)
    }

    pub fn removed_item(&self, id: ItemId) -> Option<&Item> {
        self.removed.iter().find(|item| item.id == id)
    }

    pub fn change_for(&self, id: ItemId) -> Option<&ItemChange> {
        self.updated.iter().find(|change| change.id() == id)
    }

    /// Rewrite every occurrence of `from` (as id or parent) to `to`
    pub fn substitute_id(&mut self, from: ItemId, to: ItemId) {
        let items = self
            .created
            .iter_mut()
            .chain(self.removed.iter_mut())
            .chain(
                self.updated
                    .iter_mut()
                    .flat_map(|change| [&mut change.before, &mut change.after]),
            );
        for item in items {
            if item.id == from {
                item.id = to;
            }
            if item.parent_id == Some(from) {
                item.parent_id = Some(to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, parent: Option<i64>, position: i32) -> Item {
        let mut item = Item::new_root(ItemId::Confirmed(id), position);
        item.parent_id = parent.map(ItemId::Confirmed);
        item
    }

    #[test]
    fn test_inverse_swaps_sides() {
        let mut moved = item(2, None, 1);
        let before = moved.clone();
        moved.position = 0;
        let changes = ChangeSet {
            created: vec![item(1, None, 0)],
            updated: vec![ItemChange { before, after: moved }],
            removed: vec![item(3, None, 2)],
        };

        let inverse = changes.inverse();
        assert_eq!(inverse.created[0].id, ItemId::Confirmed(3));
        assert_eq!(inverse.removed[0].id, ItemId::Confirmed(1));
        assert_eq!(inverse.updated[0].after.position, 1);
        assert_eq!(inverse.inverse(), changes);
    }

    #[test]
    fn test_substitute_rewrites_ids_and_parents() {
        let mut changes = ChangeSet {
            created: vec![Item::new_root(ItemId::Pending(1), 0)],
            updated: Vec::new(),
            removed: vec![Item::new_child(ItemId::Pending(2), ItemId::Pending(1), 0)],
        };
        changes.substitute_id(ItemId::Pending(1), ItemId::Confirmed(10));
        assert_eq!(changes.created[0].id, ItemId::Confirmed(10));
        assert_eq!(changes.removed[0].parent_id, Some(ItemId::Confirmed(10)));
        assert_eq!(changes.removed[0].id, ItemId::Pending(2));
    }

    #[test]
    fn test_restricted_to_keeps_listed_ids_in_order() {
        let mut moved = item(4, None, 1);
        let before = moved.clone();
        moved.position = 2;
        let changes = ChangeSet {
            created: vec![item(1, None, 0), item(2, Some(1), 0)],
            updated: vec![ItemChange { before, after: moved }],
            removed: vec![item(5, None, 3), item(6, Some(5), 0)],
        };

        let ids: HashSet<ItemId> = [1, 5, 6].into_iter().map(ItemId::Confirmed).collect();
        let part = changes.restricted_to(&ids);
        assert_eq!(part.created, vec![item(1, None, 0)]);
        assert!(part.updated.is_empty());
        assert_eq!(part.removed, changes.removed);
        assert!(changes.restricted_to(&HashSet::new()).is_empty());
    }
}
