//! Item Hierarchy Operations
//!
//! Operations that change parent-child relationships, plus the two cascades
//! (delete and completion) that apply to a whole subtree.

use crate::domain::{DomainError, DomainResult, ItemId};
use crate::store::TreeStore;
use crate::tree;

use super::{ChangeSet, Plan};

/// Reparent `node` under its previous sibling, as that sibling's last child.
/// No-op when `node` is first in its group.
pub fn indent(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let mut node = plan.item(node)?;
    let group = plan.siblings(node.parent_id);
    let Some(index) = group.iter().position(|sibling| sibling.id == node.id) else {
        return Ok(ChangeSet::default());
    };
    if index == 0 {
        return Ok(ChangeSet::default());
    }
    let mut new_parent = group[index - 1].clone();

    let old_parent = node.parent_id;
    node.parent_id = Some(new_parent.id);
    node.position = plan.siblings(Some(new_parent.id)).len() as i32;
    plan.set(node);
    if !new_parent.is_expanded {
        new_parent.is_expanded = true;
        plan.set(new_parent.clone());
    }
    plan.reindex(old_parent);
    plan.reindex(Some(new_parent.id));
    Ok(plan.finish())
}

/// Promote `node` one level, to the end of its grandparent's group.
/// No-op at root level.
pub fn outdent(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let mut node = plan.item(node)?;
    let Some(parent_id) = node.parent_id else {
        return Ok(ChangeSet::default());
    };
    let parent = plan.item(parent_id)?;

    node.parent_id = parent.parent_id;
    node.position = plan.siblings(parent.parent_id).len() as i32;
    plan.set(node);
    plan.reindex(Some(parent_id));
    plan.reindex(parent.parent_id);
    Ok(plan.finish())
}

/// Move `dragged` into `target`'s group at `target`'s position; the target and
/// everything after it shift down by one. Dropping onto itself changes nothing.
pub fn drag_move(store: &TreeStore, dragged: ItemId, target: ItemId) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let mut moving = plan.item(dragged)?;
    if dragged == target {
        return Ok(ChangeSet::default());
    }
    let target = plan.item(target)?;

    if let Some(parent) = target.parent_id {
        if parent == dragged || tree::ancestors(store, parent).contains(&dragged) {
            return Err(DomainError::Cycle { id: dragged, parent });
        }
    }

    let old_parent = moving.parent_id;
    plan.shift_from(target.parent_id, target.position, Some(dragged));
    moving.parent_id = target.parent_id;
    moving.position = target.position;
    plan.set(moving);
    if old_parent != target.parent_id {
        plan.reindex(old_parent);
    }
    plan.reindex(target.parent_id);
    Ok(plan.finish())
}

/// Remove `node` and its whole subtree as one change set
pub fn delete(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    let closure = tree::subtree(store, node);
    let Some(root) = closure.first() else {
        return Err(DomainError::NotFound(node));
    };
    let parent = root.parent_id;

    let mut plan = Plan::new(store);
    for item in closure {
        plan.remove(item);
    }
    plan.reindex(parent);
    Ok(plan.finish())
}

/// Set completion on `node` and every descendant
pub fn set_completed(store: &TreeStore, node: ItemId, value: bool) -> DomainResult<ChangeSet> {
    let closure = tree::subtree(store, node);
    if closure.is_empty() {
        return Err(DomainError::NotFound(node));
    }

    let mut plan = Plan::new(store);
    for mut item in closure {
        if item.is_completed != value {
            item.is_completed = value;
            plan.set(item);
        }
    }
    Ok(plan.finish())
}
