//! Tree Utilities
//!
//! Read-only queries over the tree: display flattening, descendant closure,
//! ancestry and sibling lookup.

use std::collections::HashMap;

use crate::domain::{Item, ItemId};
use crate::store::TreeStore;

/// Render items as indented tree using recursive DFS
/// Returns (Item, depth) pairs in display order
pub fn flatten_tree(items: &[Item]) -> Vec<(Item, usize)> {
    flatten_from(items, None)
}

/// Same as [`flatten_tree`], starting below `root` (None = top level).
/// Children of collapsed items are skipped.
pub fn flatten_from(items: &[Item], root: Option<ItemId>) -> Vec<(Item, usize)> {
    // Build parent -> children map
    let mut children_map: HashMap<Option<ItemId>, Vec<&Item>> = HashMap::new();
    for item in items {
        children_map.entry(item.parent_id).or_default().push(item);
    }

    // Sort children by position
    for children in children_map.values_mut() {
        children.sort_by_key(|i| (i.position, i.id));
    }

    fn collect(
        parent_id: Option<ItemId>,
        depth: usize,
        children_map: &HashMap<Option<ItemId>, Vec<&Item>>,
        result: &mut Vec<(Item, usize)>,
    ) {
        if let Some(children) = children_map.get(&parent_id) {
            for item in children {
                result.push(((*item).clone(), depth));
                if item.is_expanded {
                    collect(Some(item.id), depth + 1, children_map, result);
                }
            }
        }
    }

    let mut result = Vec::new();
    collect(root, 0, &children_map, &mut result);
    result
}

/// All descendants of `id` in pre-order, excluding `id` itself
pub fn descendants(store: &TreeStore, id: ItemId) -> Vec<Item> {
    let mut result = Vec::new();
    let mut to_visit: Vec<ItemId> = store.children(Some(id)).iter().rev().map(|i| i.id).collect();
    while let Some(current) = to_visit.pop() {
        if let Some(item) = store.get(current) {
            result.push(item.clone());
            to_visit.extend(store.children(Some(current)).iter().rev().map(|i| i.id));
        }
    }
    result
}

/// `id` followed by its descendants, pre-order
pub fn subtree(store: &TreeStore, id: ItemId) -> Vec<Item> {
    let mut result = Vec::new();
    if let Some(item) = store.get(id) {
        result.push(item.clone());
        result.extend(descendants(store, id));
    }
    result
}

/// Ancestors of `id`, nearest first
pub fn ancestors(store: &TreeStore, id: ItemId) -> Vec<ItemId> {
    let mut result = Vec::new();
    let mut current = store.get(id).and_then(|item| item.parent_id);
    while let Some(parent) = current {
        if result.contains(&parent) {
            break;
        }
        result.push(parent);
        current = store.get(parent).and_then(|item| item.parent_id);
    }
    result
}

/// True when walking up from `node` (inclusive) reaches `ancestor`.
/// Parent chains longer than the collection are treated as cyclic.
pub fn is_ancestor_in(items: &HashMap<ItemId, Item>, ancestor: ItemId, node: ItemId) -> bool {
    let mut current = Some(node);
    let mut steps = 0usize;
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        steps += 1;
        if steps > items.len() {
            return true;
        }
        current = items.get(&id).and_then(|item| item.parent_id);
    }
    false
}

/// Sibling immediately before `item` by position
pub fn previous_sibling<'a>(store: &'a TreeStore, item: &Item) -> Option<&'a Item> {
    store
        .children(item.parent_id)
        .into_iter()
        .filter(|sibling| sibling.id != item.id && sibling.position < item.position)
        .last()
}

/// Sibling immediately after `item` by position
pub fn next_sibling<'a>(store: &'a TreeStore, item: &Item) -> Option<&'a Item> {
    store
        .children(item.parent_id)
        .into_iter()
        .find(|sibling| sibling.id != item.id && sibling.position > item.position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(id: i64, parent_id: Option<i64>, position: i32) -> Item {
        let mut item = Item::new_root(ItemId::Confirmed(id), position)
            .with_content(format!("Item {}", id));
        item.parent_id = parent_id.map(ItemId::Confirmed);
        item
    }

    fn c(id: i64) -> ItemId {
        ItemId::Confirmed(id)
    }

    fn sample() -> Vec<Item> {
        vec![
            make_item(1, None, 0),    // Root 1
            make_item(2, None, 1),    // Root 2
            make_item(3, Some(1), 0), // Child of 1
            make_item(4, Some(1), 1), // Child of 1
            make_item(5, Some(3), 0), // Child of 3 (grandchild of 1)
        ]
    }

    #[test]
    fn test_flatten_tree() {
        let tree = flatten_tree(&sample());

        // Should be: 1 (depth 0), 3 (depth 1), 5 (depth 2), 4 (depth 1), 2 (depth 0)
        assert_eq!(tree.len(), 5);
        assert_eq!(tree[0].0.id, c(1)); assert_eq!(tree[0].1, 0);
        assert_eq!(tree[1].0.id, c(3)); assert_eq!(tree[1].1, 1);
        assert_eq!(tree[2].0.id, c(5)); assert_eq!(tree[2].1, 2);
        assert_eq!(tree[3].0.id, c(4)); assert_eq!(tree[3].1, 1);
        assert_eq!(tree[4].0.id, c(2)); assert_eq!(tree[4].1, 0);
    }

    #[test]
    fn test_flatten_skips_collapsed_children() {
        let mut items = sample();
        items[2].is_expanded = false; // item 3
        let ids: Vec<ItemId> = flatten_tree(&items).into_iter().map(|(i, _)| i.id).collect();
        assert_eq!(ids, vec![c(1), c(3), c(4), c(2)]);
    }

    #[test]
    fn test_flatten_from_subtree() {
        let ids: Vec<(ItemId, usize)> = flatten_from(&sample(), Some(c(1)))
            .into_iter()
            .map(|(i, depth)| (i.id, depth))
            .collect();
        assert_eq!(ids, vec![(c(3), 0), (c(5), 1), (c(4), 0)]);
    }

    #[test]
    fn test_descendants_and_ancestors() {
        let mut store = TreeStore::new();
        store.replace_all(sample()).unwrap();

        let ids: Vec<ItemId> = descendants(&store, c(1)).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![c(3), c(5), c(4)]);
        assert!(descendants(&store, c(2)).is_empty());
        assert_eq!(subtree(&store, c(3)).len(), 2);
        assert_eq!(ancestors(&store, c(5)), vec![c(3), c(1)]);
    }

    #[test]
    fn test_sibling_lookup() {
        let mut store = TreeStore::new();
        store.replace_all(sample()).unwrap();
        let four = store.get(c(4)).unwrap().clone();
        let three = store.get(c(3)).unwrap().clone();

        assert_eq!(previous_sibling(&store, &four).map(|i| i.id), Some(c(3)));
        assert!(previous_sibling(&store, &three).is_none());
        assert_eq!(next_sibling(&store, &three).map(|i| i.id), Some(c(4)));
        assert!(next_sibling(&store, &four).is_none());
    }
}
