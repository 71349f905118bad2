//! Action Log (Undo/Redo)
//!
//! Two stacks of invertible records. Recording a fresh action clears the
//! redo stack (branching history, not a merge).
//!
//! ```text
//!   push ──▶ [undo] ──pop_undo──▶ session applies inverse ──▶ push_redo ──▶ [redo]
//!            [undo] ◀──push_undo── session re-applies     ◀──pop_redo──  [redo]
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{Item, ItemId};
use crate::mutation::ChangeSet;

/// What kind of user action a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Delete,
    Update,
    Move,
    Complete,
}

/// One undoable action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    /// The item the user acted on
    pub subject: ItemId,
    /// Everything the action changed
    pub changes: ChangeSet,
}

impl ActionRecord {
    pub fn new(kind: ActionKind, subject: ItemId, changes: ChangeSet) -> Self {
        Self {
            kind,
            subject,
            changes,
        }
    }

    /// Subject as it was before the action (or as created, for creates)
    pub fn subject_snapshot(&self) -> Option<&Item> {
        self.changes
            .change_for(self.subject)
            .map(|change| &change.before)
            .or_else(|| self.changes.removed_item(self.subject))
            .or_else(|| self.changes.created_item(self.subject))
    }

    pub fn prior_parent_id(&self) -> Option<Option<ItemId>> {
        self.changes
            .change_for(self.subject)
            .filter(|change| change.before.placement_differs(&change.after))
            .map(|change| change.before.parent_id)
    }

    pub fn prior_position(&self) -> Option<i32> {
        self.changes
            .change_for(self.subject)
            .filter(|change| change.before.placement_differs(&change.after))
            .map(|change| change.before.position)
    }

    pub fn prior_content(&self) -> Option<&str> {
        self.changes
            .change_for(self.subject)
            .filter(|change| change.before.content != change.after.content)
            .map(|change| change.before.content.as_str())
    }

    fn substitute_id(&mut self, from: ItemId, to: ItemId) {
        if self.subject == from {
            self.subject = to;
        }
        self.changes.substitute_id(from, to);
    }
}

/// Undo/redo stacks
#[derive(Debug)]
pub struct ActionLog {
    /// Most recent last
    undo_stack: Vec<ActionRecord>,
    /// Most recently undone last
    redo_stack: Vec<ActionRecord>,
    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionLog {
    /// Create a new log with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    /// Record a fresh action; invalidates the redo history
    pub fn push(&mut self, record: ActionRecord) {
        self.redo_stack.clear();
        self.push_undo(record);
    }

    pub fn pop_undo(&mut self) -> Option<ActionRecord> {
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<ActionRecord> {
        self.redo_stack.pop()
    }

    /// Put a record on the undo stack without touching redo
    pub fn push_undo(&mut self, record: ActionRecord) {
        self.undo_stack.push(record);
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            let overflow = self.undo_stack.len() - self.max_levels;
            self.undo_stack.drain(..overflow);
        }
    }

    pub fn push_redo(&mut self, record: ActionRecord) {
        self.redo_stack.push(record);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Most recent undoable record
    pub fn peek_undo(&self) -> Option<&ActionRecord> {
        self.undo_stack.last()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Migrate every recorded reference from `from` to `to`
    pub fn substitute_id(&mut self, from: ItemId, to: ItemId) {
        for record in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            record.substitute_id(from, to);
        }
    }
}
