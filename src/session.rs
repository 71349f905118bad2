//! Outline Session
//!
//! [`Outline`] is the single owner of the tree store, the action log and the
//! zoom navigator, and the single writer over the store. Every user gesture
//! goes through it:
//!
//! ```text
//!   gesture ──▶ mutation planner ──▶ ChangeSet ──▶ store.apply
//!                                         │──▶ action log
//!                                         └──▶ sync queue ──▶ authority
//!                                                   │
//!   store / log / zoom ◀── id substitution ◀── SyncEvent::Resolved
//! ```
//!
//! Local changes are visible before any remote call is made. Identity
//! confirmations from the sync worker are applied at the start of every
//! operation, so callers may keep using the id they were handed at creation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::authority::ItemAuthority;
use crate::config::OutlineConfig;
use crate::domain::{DomainResult, Item, ItemId, LocalId};
use crate::history::{ActionKind, ActionLog, ActionRecord};
use crate::mutation::{self, ChangeSet};
use crate::store::{StoreEvent, TreeStore};
use crate::sync::{spawn_sync, Operation, SyncEvent, SyncHandle, SyncStatus};
use crate::zoom::ZoomNavigator;

pub struct Outline {
    store: TreeStore,
    history: ActionLog,
    zoom: ZoomNavigator,
    sync: SyncHandle,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    authority: Arc<dyn ItemAuthority>,
    /// Last minted local id
    last_local: LocalId,
    /// Every id substitution applied so far: old id -> current id
    aliases: HashMap<ItemId, ItemId>,
}

impl Outline {
    /// Create an empty outline and start its sync worker.
    /// Must be called within a tokio runtime.
    pub fn new(authority: Arc<dyn ItemAuthority>, config: OutlineConfig) -> Self {
        let (sync, events) = spawn_sync(Arc::clone(&authority), config.sync);
        Self {
            store: TreeStore::new(),
            history: ActionLog::with_max_levels(config.history.max_levels),
            zoom: ZoomNavigator::new(),
            sync,
            events,
            authority,
            last_local: 0,
            aliases: HashMap::new(),
        }
    }

    // ========================
    // Accessors
    // ========================

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn history(&self) -> &ActionLog {
        &self.history
    }

    pub fn zoom(&self) -> &ZoomNavigator {
        &self.zoom
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    /// Register for store change notifications
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Current id for `id`, following substitutions
    pub fn resolve(&self, id: ItemId) -> ItemId {
        self.aliases.get(&id).copied().unwrap_or(id)
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.store.get(self.resolve(id))
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ========================
    // Creation
    // ========================

    /// Append a new item at root level
    pub fn create_root(&mut self) -> DomainResult<ItemId> {
        self.apply_sync_events();
        let id = self.mint_id();
        let changes = mutation::create_root(&self.store, id)?;
        self.commit(Some(ActionKind::Create), id, changes)?;
        Ok(id)
    }

    pub fn create_sibling_after(&mut self, node: ItemId) -> DomainResult<ItemId> {
        let node = self.prepare(node);
        let id = self.mint_id();
        let changes = mutation::create_sibling_after(&self.store, node, id)?;
        self.commit(Some(ActionKind::Create), id, changes)?;
        Ok(id)
    }

    pub fn create_child(&mut self, node: ItemId) -> DomainResult<ItemId> {
        let node = self.prepare(node);
        let id = self.mint_id();
        let changes = mutation::create_child(&self.store, node, id)?;
        self.commit(Some(ActionKind::Create), id, changes)?;
        Ok(id)
    }

    pub fn duplicate(&mut self, node: ItemId) -> DomainResult<ItemId> {
        let node = self.prepare(node);
        let id = self.mint_id();
        let changes = mutation::duplicate(&self.store, node, id)?;
        self.commit(Some(ActionKind::Create), id, changes)?;
        Ok(id)
    }

    // ========================
    // Structure
    // ========================

    /// Returns whether anything changed
    pub fn indent(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::indent(&self.store, node)?;
        self.commit(Some(ActionKind::Move), node, changes)
    }

    pub fn outdent(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::outdent(&self.store, node)?;
        self.commit(Some(ActionKind::Move), node, changes)
    }

    pub fn move_up(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::move_up(&self.store, node)?;
        self.commit(Some(ActionKind::Move), node, changes)
    }

    pub fn move_down(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::move_down(&self.store, node)?;
        self.commit(Some(ActionKind::Move), node, changes)
    }

    /// Drop `dragged` onto `target`'s slot
    pub fn drag_move(&mut self, dragged: ItemId, target: ItemId) -> DomainResult<bool> {
        let dragged = self.prepare(dragged);
        let target = self.resolve(target);
        let changes = mutation::drag_move(&self.store, dragged, target)?;
        self.commit(Some(ActionKind::Move), dragged, changes)
    }

    /// Delete `node` and its subtree
    pub fn delete(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::delete(&self.store, node)?;
        self.commit(Some(ActionKind::Delete), node, changes)
    }

    // ========================
    // Attributes
    // ========================

    pub fn set_completed(&mut self, node: ItemId, value: bool) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::set_completed(&self.store, node, value)?;
        self.commit(Some(ActionKind::Complete), node, changes)
    }

    /// Display state only: synced, but not recorded in history
    pub fn toggle_expanded(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::toggle_expanded(&self.store, node)?;
        self.commit(None, node, changes)
    }

    pub fn toggle_starred(&mut self, node: ItemId) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::toggle_starred(&self.store, node)?;
        self.commit(Some(ActionKind::Update), node, changes)
    }

    pub fn update_content(&mut self, node: ItemId, content: &str) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::update_content(&self.store, node, content)?;
        self.commit(Some(ActionKind::Update), node, changes)
    }

    pub fn update_notes(&mut self, node: ItemId, notes: &str) -> DomainResult<bool> {
        let node = self.prepare(node);
        let changes = mutation::update_notes(&self.store, node, notes)?;
        self.commit(Some(ActionKind::Update), node, changes)
    }

    // ========================
    // Zoom
    // ========================

    pub fn zoom_in(&mut self, node: ItemId) -> DomainResult<()> {
        let node = self.prepare(node);
        self.zoom.zoom_in(&self.store, node)
    }

    pub fn zoom_out(&mut self) -> Option<ItemId> {
        self.zoom.zoom_out()
    }

    pub fn zoom_to_root(&mut self) {
        self.zoom.zoom_to_root();
    }

    pub fn zoom_to_level(&mut self, index: usize) {
        self.zoom.zoom_to_level(index);
    }

    pub fn breadcrumbs(&self) -> Vec<String> {
        self.zoom.breadcrumbs(&self.store)
    }

    /// Rows to render under the current zoom, with depth
    pub fn visible(&self) -> Vec<(Item, usize)> {
        self.zoom.visible(&self.store)
    }

    // ========================
    // History
    // ========================

    /// Revert the most recent action locally and remotely.
    ///
    /// Returns `Ok(false)` when there is nothing to undo. When the authority
    /// rejects the change, local state is restored, whatever the authority
    /// already applied is reverted remotely and the record stays on the
    /// undo stack.
    pub async fn undo(&mut self) -> DomainResult<bool> {
        self.apply_sync_events();
        let Some(record) = self.history.pop_undo() else {
            return Ok(false);
        };
        log::debug!("Undo {:?} of {}", record.kind, record.subject);

        let result = self.replay(&record.changes.inverse()).await;
        match result {
            Ok(()) => self.history.push_redo(record),
            Err(_) => self.history.push_undo(record),
        }
        self.apply_sync_events();
        result.map(|()| true)
    }

    /// Re-apply the most recently undone action locally and remotely
    pub async fn redo(&mut self) -> DomainResult<bool> {
        self.apply_sync_events();
        let Some(record) = self.history.pop_redo() else {
            return Ok(false);
        };
        log::debug!("Redo {:?} of {}", record.kind, record.subject);

        let result = self.replay(&record.changes).await;
        match result {
            Ok(()) => self.history.push_undo(record),
            Err(_) => self.history.push_redo(record),
        }
        self.apply_sync_events();
        result.map(|()| true)
    }

    async fn replay(&mut self, changes: &ChangeSet) -> DomainResult<()> {
        let snapshot = self.store.all();
        let zoom = self.zoom.clone();

        self.store.apply(changes)?;
        self.zoom.reconcile(&self.store);

        let Err(rejection) = self.sync.mirror(Operation::from_changes(changes)).await else {
            return Ok(());
        };
        log::warn!("Authority rejected the change, rolling back: {}", rejection);
        self.store.replace_all(snapshot)?;
        self.zoom = zoom;

        let accepted = accepted_part(changes, &rejection.applied);
        if !accepted.is_empty() {
            log::info!(
                "Reverting {} operations the authority already applied",
                rejection.applied.len()
            );
            if let Err(error) = self.sync.enqueue(Operation::from_changes(&accepted.inverse())) {
                log::warn!("Could not queue the remote revert: {}", error);
            }
        }
        Err(rejection.error)
    }

    // ========================
    // Seeding
    // ========================

    /// Fetch the whole outline from the authority, breadth first, and make
    /// it the local state. Local changes not yet synced are discarded, so
    /// callers normally [`settle`](Self::settle) first.
    pub async fn load(&mut self) -> DomainResult<usize> {
        let mut items = self.authority.list_roots().await?;
        let mut frontier: VecDeque<_> = items.iter().filter_map(|item| item.id.remote()).collect();
        while let Some(parent) = frontier.pop_front() {
            let children = self.authority.list_children(parent).await?;
            frontier.extend(children.iter().filter_map(|item| item.id.remote()));
            items.extend(children);
        }

        let count = items.len();
        self.reset(items)?;
        log::info!("Loaded {} items from the authority", count);
        Ok(count)
    }

    /// Replace local state with items from an import codec
    pub fn import(&mut self, items: Vec<Item>) -> DomainResult<()> {
        let count = items.len();
        self.reset(items)?;
        log::info!("Imported {} items", count);
        Ok(())
    }

    fn reset(&mut self, items: Vec<Item>) -> DomainResult<()> {
        self.apply_sync_events();
        let highest_local = items
            .iter()
            .filter_map(|item| match item.id {
                ItemId::Pending(local) => Some(local),
                ItemId::Confirmed(_) => None,
            })
            .max()
            .unwrap_or(0);
        self.store.replace_all(items)?;
        self.last_local = self.last_local.max(highest_local);
        self.history.clear();
        self.zoom.zoom_to_root();
        Ok(())
    }

    // ========================
    // Sync
    // ========================

    /// Wait until every queued operation has been delivered or dropped, then
    /// apply the identity confirmations that came back
    pub async fn settle(&mut self) -> DomainResult<()> {
        self.sync.wait_idle().await?;
        self.apply_sync_events();
        Ok(())
    }

    /// Apply identity confirmations received from the sync worker.
    /// Returns how many were applied.
    pub fn apply_sync_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            match event {
                SyncEvent::Resolved { from, to } => {
                    if let Err(error) = self.store.substitute_id(from, to) {
                        log::warn!("Could not substitute {} with {}: {}", from, to, error);
                        continue;
                    }
                    self.history.substitute_id(from, to);
                    self.zoom.substitute_id(from, to);
                    for current in self.aliases.values_mut() {
                        if *current == from {
                            *current = to;
                        }
                    }
                    self.aliases.insert(from, to);
                    applied += 1;
                }
            }
        }
        applied
    }

    pub fn shutdown(&self) {
        self.sync.shutdown();
    }

    // ========================
    // Internals
    // ========================

    fn prepare(&mut self, node: ItemId) -> ItemId {
        self.apply_sync_events();
        self.resolve(node)
    }

    fn mint_id(&mut self) -> ItemId {
        self.last_local += 1;
        ItemId::Pending(self.last_local)
    }

    /// Apply, record and queue one change set. Empty change sets are no-ops.
    fn commit(
        &mut self,
        kind: Option<ActionKind>,
        subject: ItemId,
        changes: ChangeSet,
    ) -> DomainResult<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.store.apply(&changes)?;
        log::debug!(
            "{:?} on {}: {} created, {} updated, {} removed",
            kind,
            subject,
            changes.created.len(),
            changes.updated.len(),
            changes.removed.len()
        );

        let operations = Operation::from_changes(&changes);
        if let Some(kind) = kind {
            self.history.push(ActionRecord::new(kind, subject, changes));
        }
        self.zoom.reconcile(&self.store);
        if let Err(error) = self.sync.enqueue(operations) {
            log::warn!("Change to {} applied locally but not queued: {}", subject, error);
        }
        Ok(true)
    }
}

/// The part of `changes` that `applied` carried out remotely. A remote delete
/// takes the removed descendants with it.
fn accepted_part(changes: &ChangeSet, applied: &[Operation]) -> ChangeSet {
    let mut touched: HashSet<ItemId> = applied.iter().map(Operation::subject).collect();
    let removed: HashSet<ItemId> = changes.removed.iter().map(|item| item.id).collect();
    for item in &changes.removed {
        if item
            .parent_id
            .is_some_and(|parent| removed.contains(&parent) && touched.contains(&parent))
        {
            touched.insert(item.id);
        }
    }
    changes.restricted_to(&touched)
}
