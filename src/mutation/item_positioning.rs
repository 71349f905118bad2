//! Item Positioning Operations
//!
//! Creation and ordering of items within their sibling group.

use crate::domain::{DomainResult, Item, ItemId};
use crate::store::TreeStore;

use super::{ChangeSet, Plan};

/// Append a new item at the end of the root level
pub fn create_root(store: &TreeStore, new_id: ItemId) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let position = plan.siblings(None).len() as i32;
    plan.create(Item::new_root(new_id, position));
    plan.reindex(None);
    Ok(plan.finish())
}

/// New sibling directly after `node`; later siblings shift down by one
pub fn create_sibling_after(
    store: &TreeStore,
    node: ItemId,
    new_id: ItemId,
) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let node = plan.item(node)?;
    insert_after(&mut plan, &node, new_item(new_id, node.parent_id, node.position + 1));
    Ok(plan.finish())
}

/// New last child of `node`. The parent is expanded so the child is visible.
pub fn create_child(store: &TreeStore, node: ItemId, new_id: ItemId) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let mut parent = plan.item(node)?;
    let position = plan.siblings(Some(parent.id)).len() as i32;
    plan.create(Item::new_child(new_id, parent.id, position));
    if !parent.is_expanded {
        parent.is_expanded = true;
        plan.set(parent.clone());
    }
    plan.reindex(Some(parent.id));
    Ok(plan.finish())
}

/// Copy of `node` (content, completion, tags, notes) placed right after it.
/// Children are not copied.
pub fn duplicate(store: &TreeStore, node: ItemId, new_id: ItemId) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let node = plan.item(node)?;
    let mut copy = new_item(new_id, node.parent_id, node.position + 1);
    copy.content = node.content.clone();
    copy.is_completed = node.is_completed;
    copy.tags = node.tags.clone();
    copy.notes = node.notes.clone();
    insert_after(&mut plan, &node, copy);
    Ok(plan.finish())
}

/// Swap with the previous sibling. No-op at the top of the group.
pub fn move_up(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    swap_with_neighbour(store, node, Direction::Up)
}

/// Swap with the next sibling. No-op at the bottom of the group.
pub fn move_down(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    swap_with_neighbour(store, node, Direction::Down)
}

// ========================
// Helpers
// ========================

enum Direction {
    Up,
    Down,
}

fn new_item(id: ItemId, parent_id: Option<ItemId>, position: i32) -> Item {
    match parent_id {
        Some(parent) => Item::new_child(id, parent, position),
        None => Item::new_root(id, position),
    }
}

fn insert_after(plan: &mut Plan<'_>, node: &Item, item: Item) {
    plan.shift_from(node.parent_id, item.position, None);
    plan.create(item);
    plan.reindex(node.parent_id);
}

/// Exchange slots with the neighbour by index, then renumber the group.
/// Works on groups whose positions collide as well.
fn swap_with_neighbour(store: &TreeStore, node: ItemId, direction: Direction) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let node = plan.item(node)?;
    let mut group = plan.siblings(node.parent_id);
    let Some(index) = group.iter().position(|sibling| sibling.id == node.id) else {
        return Ok(ChangeSet::default());
    };
    let other = match direction {
        Direction::Up if index > 0 => index - 1,
        Direction::Down if index + 1 < group.len() => index + 1,
        _ => return Ok(ChangeSet::default()),
    };

    group.swap(index, other);
    for (position, mut sibling) in group.into_iter().enumerate() {
        let position = position as i32;
        if sibling.position != position {
            sibling.position = position;
            plan.set(sibling);
        }
    }
    Ok(plan.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::test_support::*;

    fn p(id: u64) -> ItemId {
        ItemId::Pending(id)
    }

    #[test]
    fn test_create_root_appends() {
        let mut store = store_with(vec![root(1, 0), root(2, 1)]);
        let changes = create_root(&store, p(1)).unwrap();
        assert_eq!(changes.created.len(), 1);
        assert!(changes.updated.is_empty());
        apply(&mut store, changes);
        assert_eq!(order(&store, None), vec![c(1), c(2), p(1)]);
    }

    #[test]
    fn test_create_sibling_after_shifts_later_siblings() {
        let mut store = store_with(vec![root(1, 0), root(2, 1), root(3, 2)]);
        let changes = create_sibling_after(&store, c(1), p(1)).unwrap();

        let created = &changes.created[0];
        assert_eq!(created.parent_id, None);
        assert_eq!(created.position, 1);
        assert_eq!(changes.updated.len(), 2);

        apply(&mut store, changes);
        assert_eq!(order(&store, None), vec![c(1), p(1), c(2), c(3)]);
    }

    #[test]
    fn test_create_sibling_inside_group() {
        let mut store = store_with(vec![root(1, 0), child(2, 1, 0), child(3, 1, 1)]);
        let changes = create_sibling_after(&store, c(3), p(1)).unwrap();
        apply(&mut store, changes);
        assert_eq!(order(&store, Some(1)), vec![c(2), c(3), p(1)]);
        assert_eq!(order(&store, None), vec![c(1)]);
    }

    #[test]
    fn test_create_child_appends_and_expands() {
        let mut collapsed = root(1, 0);
        collapsed.is_expanded = false;
        let mut store = store_with(vec![collapsed, child(2, 1, 0)]);

        let changes = create_child(&store, c(1), p(1)).unwrap();
        assert_eq!(changes.created[0].position, 1);
        assert_eq!(changes.created[0].parent_id, Some(c(1)));
        assert!(changes.change_for(c(1)).unwrap().after.is_expanded);

        apply(&mut store, changes);
        assert!(store.get(c(1)).unwrap().is_expanded);
        assert_eq!(order(&store, Some(1)), vec![c(2), p(1)]);
    }

    #[test]
    fn test_create_on_missing_node_fails() {
        let store = store_with(vec![root(1, 0)]);
        assert!(create_sibling_after(&store, c(9), p(1)).is_err());
        assert!(create_child(&store, c(9), p(1)).is_err());
    }

    #[test]
    fn test_duplicate_copies_fields_not_children() {
        let mut original = root(1, 0);
        original.is_completed = true;
        original.notes = "notes".to_string();
        original.tags.insert("#work".to_string());
        let mut store = store_with(vec![original, child(2, 1, 0), root(3, 1)]);

        let changes = duplicate(&store, c(1), p(1)).unwrap();

        apply(&mut store, changes);

        let copy = store.get(p(1)).unwrap();
        assert_eq!(copy.content, "Item 1");
        assert!(copy.is_completed);
        assert_eq!(copy.notes, "notes");
        assert!(copy.tags.contains("#work"));
        assert_eq!(order(&store, None), vec![c(1), p(1), c(3)]);
        assert!(store.children(Some(p(1))).is_empty());
    }

    #[test]
    fn test_move_down_swaps_positions() {
        let mut store = store_with(vec![root(1, 0), root(2, 1)]);
        let changes = move_down(&store, c(1)).unwrap();
        apply(&mut store, changes);

        assert_eq!(store.get(c(1)).unwrap().position, 1);
        assert_eq!(store.get(c(2)).unwrap().position, 0);
        assert_eq!(order(&store, None), vec![c(2), c(1)]);
    }

    #[test]
    fn test_move_up_swaps_positions() {
        let mut store = store_with(vec![root(1, 0), root(2, 1), root(3, 2)]);
        let changes = move_up(&store, c(3)).unwrap();
        apply(&mut store, changes);
        assert_eq!(order(&store, None), vec![c(1), c(3), c(2)]);
    }

    #[test]
    fn test_move_at_boundary_is_noop() {
        let store = store_with(vec![root(1, 0), root(2, 1)]);
        assert!(move_up(&store, c(1)).unwrap().is_empty());
        assert!(move_down(&store, c(2)).unwrap().is_empty());
    }

    #[test]
    fn test_move_within_colliding_group() {
        let mut store = store_with(vec![root(1, 0), root(2, 0), root(3, 0)]);
        let changes = move_down(&store, c(1)).unwrap();
        assert!(!changes.is_empty());
        apply(&mut store, changes);
        assert_eq!(order(&store, None), vec![c(2), c(1), c(3)]);

        let changes = move_up(&store, c(3)).unwrap();
        apply(&mut store, changes);
        assert_eq!(order(&store, None), vec![c(2), c(3), c(1)]);
    }

    #[test]
    fn test_gappy_group_is_resequenced() {
        let mut store = store_with(vec![root(1, 0), root(2, 5), root(3, 9)]);
        let changes = create_sibling_after(&store, c(2), p(1)).unwrap();
        apply(&mut store, changes);
        assert_eq!(order(&store, None), vec![c(1), c(2), p(1), c(3)]);
    }
}
