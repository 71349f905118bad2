//! Tag Outline Core
//!
//! Offline-tolerant hierarchical outliner: local edits apply instantly and
//! are mirrored to a remote authority in the background.
//!
//! Layered architecture:
//! - domain: Core entities, identity and errors
//! - store / tree: In-memory tree store and read-only tree queries
//! - mutation: Ordering/mutation engine producing invertible change sets
//! - history: Undo/redo action log
//! - authority: Remote item authority abstraction and in-memory implementation
//! - sync: Ordered operation queue with id resolution and retry
//! - zoom: Focus stack and breadcrumbs
//! - session: `Outline`, the single owner wiring the layers together

pub mod authority;
pub mod config;
pub mod domain;
pub mod history;
pub mod mutation;
pub mod session;
pub mod store;
pub mod sync;
pub mod tree;
pub mod zoom;


pub use authority::{ItemAuthority, MemoryAuthority};
pub use config::{ConfigError, OutlineConfig};
pub use domain::{DomainError, DomainResult, Item, ItemId};
pub use history::{ActionKind, ActionLog, ActionRecord};
pub use mutation::ChangeSet;
pub use session::Outline;
pub use store::{StoreEvent, TreeStore};
pub use sync::{MirrorRejection, SyncState, SyncStatus};
pub use zoom::ZoomNavigator;
