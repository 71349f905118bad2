//! Item Attribute Operations
//!
//! Single-item edits with no structural effect.

use crate::domain::{DomainResult, Item, ItemId};
use crate::store::TreeStore;

use super::{ChangeSet, Plan};

pub fn update_content(store: &TreeStore, node: ItemId, content: &str) -> DomainResult<ChangeSet> {
    edit(store, node, |item| item.content = content.to_string())
}

pub fn update_notes(store: &TreeStore, node: ItemId, notes: &str) -> DomainResult<ChangeSet> {
    edit(store, node, |item| item.notes = notes.to_string())
}

pub fn toggle_starred(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    edit(store, node, |item| item.is_starred = !item.is_starred)
}

/// Flip expansion. Display state only: no cascade.
pub fn toggle_expanded(store: &TreeStore, node: ItemId) -> DomainResult<ChangeSet> {
    edit(store, node, |item| item.is_expanded = !item.is_expanded)
}

fn edit(store: &TreeStore, node: ItemId, change: impl FnOnce(&mut Item)) -> DomainResult<ChangeSet> {
    let mut plan = Plan::new(store);
    let mut item = plan.item(node)?;
    change(&mut item);
    plan.set(item);
    Ok(plan.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::test_support::*;

    #[test]
    fn test_update_content_records_prior_value() {
        let store = store_with(vec![root(1, 0)]);
        let changes = update_content(&store, c(1), "renamed").unwrap();
        let change = changes.change_for(c(1)).unwrap();
        assert_eq!(change.before.content, "Item 1");
        assert_eq!(change.after.content, "renamed");
    }

    #[test]
    fn test_same_content_is_noop() {
        let store = store_with(vec![root(1, 0)]);
        assert!(update_content(&store, c(1), "Item 1").unwrap().is_empty());
    }

    #[test]
    fn test_toggle_expanded_does_not_cascade() {
        let mut store = store_with(vec![root(1, 0), child(2, 1, 0)]);
        let changes = toggle_expanded(&store, c(1)).unwrap();
        apply(&mut store, changes);
        assert!(!store.get(c(1)).unwrap().is_expanded);
        assert!(store.get(c(2)).unwrap().is_expanded);
    }

    #[test]
    fn test_star_and_notes() {
        let mut store = store_with(vec![root(1, 0)]);
        let changes = toggle_starred(&store, c(1)).unwrap();
        apply(&mut store, changes);
        let changes = update_notes(&store, c(1), "remember").unwrap();
        apply(&mut store, changes);
        let item = store.get(c(1)).unwrap();
        assert!(item.is_starred);
        assert_eq!(item.notes, "remember");
    }
}
