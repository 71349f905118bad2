//! Sync Engine
//!
//! Mirrors local change sets to the remote authority through a strictly
//! ordered queue with one operation in flight at a time.
//!
//! ```text
//!   SyncHandle (Clone)        mpsc        SyncWorker (tokio task)
//!   ┌────────────────────┐  ────────▶  ┌───────────────────────────────┐
//!   │ .enqueue()         │             │ VecDeque queue + retry        │
//!   │ .mirror()          │  ◀────────  │ resolution table              │
//!   │ .sync_now()        │   oneshot   │ Arc<dyn ItemAuthority>        │
//!   └────────────────────┘             └───────────────────────────────┘
//!            ▲ watch (SyncStatus)                   │ mpsc (SyncEvent)
//!            └──────────────────────────────────────┴──────▶ session
//! ```

mod actor;
mod operation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DomainError, ItemId};

pub use actor::{spawn_sync, SyncHandle};
pub use operation::{Operation, OperationKind};

/// Aggregate engine state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    /// At least one failed operation is waiting for retry
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Queued plus in-flight operations
    pub pending: usize,
}

/// Notifications from the worker back to the single writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The authority assigned a permanent id
    Resolved { from: ItemId, to: ItemId },
}

/// A mirrored batch that did not complete. The authority kept the effect of
/// `applied`; nothing after the failing operation was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} ({} operations already applied)", .applied.len())]
pub struct MirrorRejection {
    pub applied: Vec<Operation>,
    pub error: DomainError,
}

impl MirrorRejection {
    pub fn new(error: DomainError) -> Self {
        Self {
            applied: Vec::new(),
            error,
        }
    }
}

impl From<MirrorRejection> for DomainError {
    fn from(rejection: MirrorRejection) -> Self {
        rejection.error
    }
}
