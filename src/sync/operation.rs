//! Sync Operations
//!
//! Remote operations derived from a local change set. A change set maps to
//! operations in a fixed order: creates (parents before children), then
//! moves and field updates, then a placement move for every created item,
//! then deletes of the topmost removed items only (the authority cascades
//! the rest).
//!
//! The authority does not shift siblings on create, so a created item only
//! reaches its slot through its placement move. That move references the
//! new item and therefore waits behind its create even when the create is
//! retried after the sibling moves.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Item, ItemId, ItemPatch};
use crate::mutation::ChangeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Move,
}

/// One remote operation. Ids are local ids; the sync worker resolves them
/// to permanent ids when the operation is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    Create { item: Item },
    Update { id: ItemId, patch: ItemPatch },
    /// Carries the item as it was when deleted
    Delete { item: Item },
    Move {
        id: ItemId,
        parent_id: Option<ItemId>,
        position: i32,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Move { .. } => OperationKind::Move,
        }
    }

    pub fn subject(&self) -> ItemId {
        match self {
            Operation::Create { item } | Operation::Delete { item } => item.id,
            Operation::Update { id, .. } | Operation::Move { id, .. } => *id,
        }
    }

    /// Prior state of the subject, where the operation keeps one
    pub fn prior(&self) -> Option<&Item> {
        match self {
            Operation::Delete { item } => Some(item),
            _ => None,
        }
    }

    /// Ids that must map to permanent ids before dispatch
    pub fn references(&self) -> Vec<ItemId> {
        match self {
            Operation::Create { item } => item.parent_id.into_iter().collect(),
            Operation::Update { id, .. } => vec![*id],
            Operation::Delete { item } => vec![item.id],
            Operation::Move { id, parent_id, .. } => {
                let mut ids = vec![*id];
                ids.extend(*parent_id);
                ids
            }
        }
    }

    pub fn is_create_of(&self, id: ItemId) -> bool {
        matches!(self, Operation::Create { item } if item.id == id)
    }

    /// Translate a change set into the operations that mirror it remotely
    pub fn from_changes(changes: &ChangeSet) -> Vec<Operation> {
        let mut operations: Vec<Operation> = changes
            .created
            .iter()
            .map(|item| Operation::Create { item: item.clone() })
            .collect();

        for change in &changes.updated {
            let (before, after) = (&change.before, &change.after);
            if before.placement_differs(after) {
                operations.push(Operation::Move {
                    id: after.id,
                    parent_id: after.parent_id,
                    position: after.position,
                });
            }
            let patch = before.diff(after);
            if !patch.is_empty() {
                operations.push(Operation::Update { id: after.id, patch });
            }
        }

        operations.extend(changes.created.iter().map(|item| Operation::Move {
            id: item.id,
            parent_id: item.parent_id,
            position: item.position,
        }));

        let removed: HashSet<ItemId> = changes.removed.iter().map(|item| item.id).collect();
        operations.extend(
            changes
                .removed
                .iter()
                .filter(|item| !item.parent_id.is_some_and(|parent| removed.contains(&parent)))
                .map(|item| Operation::Delete { item: item.clone() }),
        );
        operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::ItemChange;

    fn c(id: i64) -> ItemId {
        ItemId::Confirmed(id)
    }

    #[test]
    fn test_change_set_maps_in_order() {
        let created = Item::new_child(ItemId::Pending(1), c(1), 0);
        let before = Item::new_root(c(2), 1);
        let mut after = before.clone();
        after.position = 2;
        after.content = "moved".to_string();
        let parent = Item::new_root(c(3), 0);
        let orphan = Item::new_child(c(4), c(3), 0);

        let operations = Operation::from_changes(&ChangeSet {
            created: vec![created.clone()],
            updated: vec![ItemChange { before, after }],
            removed: vec![parent, orphan],
        });

        let kinds: Vec<OperationKind> = operations.iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Create,
                OperationKind::Move,
                OperationKind::Update,
                OperationKind::Move,
                OperationKind::Delete
            ]
        );
        assert_eq!(operations[0].subject(), created.id);
        assert_eq!(
            operations[3],
            Operation::Move {
                id: created.id,
                parent_id: Some(c(1)),
                position: 0
            }
        );
        assert_eq!(operations[4].subject(), c(3));
        assert_eq!(operations[4].prior().map(|item| item.id), Some(c(3)));
    }

    #[test]
    fn test_expansion_only_change_is_an_update() {
        let before = Item::new_root(c(1), 0);
        let mut after = before.clone();
        after.is_expanded = false;
        let operations = Operation::from_changes(&ChangeSet {
            updated: vec![ItemChange { before, after }],
            ..ChangeSet::default()
        });
        assert_eq!(operations.len(), 1);
        let Operation::Update { patch, .. } = &operations[0] else {
            panic!("expected update, got {:?}", operations[0]);
        };
        assert_eq!(patch.is_expanded, Some(false));
        assert!(patch.content.is_none());
    }

    #[test]
    fn test_references() {
        let create = Operation::Create {
            item: Item::new_child(ItemId::Pending(2), ItemId::Pending(1), 0),
        };
        assert_eq!(create.references(), vec![ItemId::Pending(1)]);
        assert!(create.is_create_of(ItemId::Pending(2)));

        let root_move = Operation::Move {
            id: c(5),
            parent_id: None,
            position: 0,
        };
        assert_eq!(root_move.references(), vec![c(5)]);
    }
}
