//! Zoom Navigator
//!
//! Focus stack over the tree. Zooming into an item shows only its subtree;
//! the stack doubles as the breadcrumb trail. The stack holds ids, so titles
//! are read from the store at the time they are shown.

use crate::domain::{DomainError, DomainResult, Item, ItemId};
use crate::store::TreeStore;
use crate::tree;

/// Title shown for an item without content
const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoomNavigator {
    stack: Vec<ItemId>,
}

impl ZoomNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus on `id`, pushing it onto the stack
    pub fn zoom_in(&mut self, store: &TreeStore, id: ItemId) -> DomainResult<()> {
        if !store.contains(id) {
            return Err(DomainError::NotFound(id));
        }
        if self.current() != Some(id) {
            self.stack.push(id);
        }
        Ok(())
    }

    /// Go up one level. No-op at the top.
    pub fn zoom_out(&mut self) -> Option<ItemId> {
        self.stack.pop()
    }

    pub fn zoom_to_root(&mut self) {
        self.stack.clear();
    }

    /// Jump to a breadcrumb, keeping entries `0..=index`
    pub fn zoom_to_level(&mut self, index: usize) {
        self.stack.truncate(index + 1);
    }

    /// Focused item (None = whole outline)
    pub fn current(&self) -> Option<ItemId> {
        self.stack.last().copied()
    }

    pub fn is_zoomed(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn stack(&self) -> &[ItemId] {
        &self.stack
    }

    /// Titles of every stack entry, outermost first
    pub fn breadcrumbs(&self, store: &TreeStore) -> Vec<String> {
        self.stack
            .iter()
            .filter_map(|id| store.get(*id))
            .map(|item| {
                if item.content.is_empty() {
                    UNTITLED.to_string()
                } else {
                    item.content.clone()
                }
            })
            .collect()
    }

    /// Rows to render under the focused item, with depth relative to it
    pub fn visible(&self, store: &TreeStore) -> Vec<(Item, usize)> {
        tree::flatten_from(&store.all(), self.current())
    }

    /// Drop the stack from the first entry that no longer exists
    pub fn reconcile(&mut self, store: &TreeStore) {
        if let Some(index) = self.stack.iter().position(|id| !store.contains(*id)) {
            log::debug!("Zoom target {} disappeared, truncating stack", self.stack[index]);
            self.stack.truncate(index);
        }
    }

    pub fn substitute_id(&mut self, from: ItemId, to: ItemId) {
        for id in self.stack.iter_mut().filter(|id| **id == from) {
            *id = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::test_support::*;

    fn outline() -> TreeStore {
        let mut untitled = child(3, 2, 0);
        untitled.content.clear();
        let mut collapsed = child(2, 1, 0);
        collapsed.is_expanded = false;
        store_with(vec![root(1, 0), collapsed, untitled, child(4, 1, 1), root(5, 1)])
    }

    #[test]
    fn test_zoom_stack_and_breadcrumbs() {
        let store = outline();
        let mut zoom = ZoomNavigator::new();
        assert!(!zoom.is_zoomed());

        zoom.zoom_in(&store, c(1)).unwrap();
        zoom.zoom_in(&store, c(2)).unwrap();
        zoom.zoom_in(&store, c(3)).unwrap();
        assert_eq!(zoom.current(), Some(c(3)));
        assert_eq!(zoom.breadcrumbs(&store), vec!["Item 1", "Item 2", "Untitled"]);

        assert_eq!(zoom.zoom_out(), Some(c(3)));
        zoom.zoom_to_level(0);
        assert_eq!(zoom.stack(), &[c(1)]);
        zoom.zoom_to_root();
        assert_eq!(zoom.current(), None);
        assert_eq!(zoom.zoom_out(), None);
    }

    #[test]
    fn test_zoom_into_missing_item_fails() {
        let store = outline();
        let mut zoom = ZoomNavigator::new();
        assert_eq!(zoom.zoom_in(&store, c(99)), Err(DomainError::NotFound(c(99))));
        assert!(!zoom.is_zoomed());
    }

    #[test]
    fn test_visible_rows_follow_focus_and_expansion() {
        let store = outline();
        let mut zoom = ZoomNavigator::new();

        let ids: Vec<ItemId> = zoom.visible(&store).iter().map(|(item, _)| item.id).collect();
        assert_eq!(ids, vec![c(1), c(2), c(4), c(5)]);

        zoom.zoom_in(&store, c(2)).unwrap();
        let rows = zoom.visible(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].0.id, rows[0].1), (c(3), 0));
    }

    #[test]
    fn test_reconcile_truncates_at_deleted_item() {
        let mut store = outline();
        let mut zoom = ZoomNavigator::new();
        for id in [1, 2, 3] {
            zoom.zoom_in(&store, c(id)).unwrap();
        }
        let changes = crate::mutation::delete(&store, c(2)).unwrap();
        apply(&mut store, changes);

        zoom.reconcile(&store);
        assert_eq!(zoom.stack(), &[c(1)]);
    }

    #[test]
    fn test_substitute_id() {
        let mut store = store_with(vec![]);
        store.insert(Item::new_root(ItemId::Pending(1), 0)).unwrap();
        let mut zoom = ZoomNavigator::new();
        zoom.zoom_in(&store, ItemId::Pending(1)).unwrap();

        zoom.substitute_id(ItemId::Pending(1), c(8));
        assert_eq!(zoom.current(), Some(c(8)));
    }
}
