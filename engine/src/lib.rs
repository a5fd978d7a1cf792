//! # Grimoire Engine
//!
//! Local-first sync for Grimoire campaigns and characters.
//!
//! Every entity is held on the device in an [`EntityStore`] and edited there,
//! online or not. A [`SyncCoordinator`] later brings the store and the remote
//! service back in line: it sends local work first, then pulls the server's
//! list and merges it without ever discarding unsynced edits.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! Each entity is wrapped in a [`Record`] carrying:
//! - A local id (UUID), stable from creation on
//! - The server id, once the server has accepted the entity
//! - A dirty flag, set on every local edit and cleared only by the coordinator
//!   after the server acknowledged that exact revision
//! - A tombstone flag for local deletes the server has not seen yet
//!
//! ### Sync cycle
//!
//! One cycle per collection, in order:
//! 1. Tombstones are sent as remote deletes
//! 2. Dirty records are sent as creates or updates, one at a time; a failure
//!    is recorded and the loop moves on
//! 3. The full remote list is pulled; a failed pull aborts the cycle and
//!    leaves the store untouched
//! 4. The list is reconciled by id (see [`reconcile`])
//!
//! ### Change notification
//!
//! [`EntityStore::subscribe`] returns a channel of [`StoreEvent`]s for the
//! whole collection or for one entity.
//!
//! ## Quick Start
//!
//! ```rust
//! use grimoire_engine::model::Campaign;
//! use grimoire_engine::remote::MemoryRemote;
//! use grimoire_engine::{EntityStore, SyncCoordinator};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), grimoire_engine::SyncError> {
//! let remote = Arc::new(MemoryRemote::new());
//! let coordinator = SyncCoordinator::new(EntityStore::shared(), remote);
//!
//! let local_id = coordinator
//!     .store()
//!     .lock()
//!     .await
//!     .create(Campaign::titled("Curse of the Crimson Throne"));
//!
//! let report = coordinator.sync().await?;
//! assert_eq!(report.created, 1);
//!
//! let store = coordinator.store().lock().await;
//! let record = store.get(local_id).unwrap();
//! assert!(!record.is_dirty());
//! assert!(record.remote_id().is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! [`EntityStore::save`] and [`EntityStore::load`] write a [`StoreSnapshot`]
//! as JSON. Dirty flags and tombstones are part of the snapshot.

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod model;
pub mod notify;
pub mod operation;
pub mod reconcile;
pub mod remote;
pub mod snapshot;
pub mod store;
pub mod workspace;

// Re-export main types at crate root
pub use config::{ClientConfig, ConfigError};
pub use coordinator::{PushFailure, SyncCoordinator, SyncOptions, SyncReport};
pub use entity::{Entity, Metadata, Origin, Record, RemoteEntity};
pub use error::{PushError, RemoteError, StoreError, SyncError};
pub use notify::{ChangeKind, EventReceiver, Interest, Notifier, StoreEvent, SubscriptionId};
pub use operation::{PushOp, PushPlan};
pub use reconcile::{ReconcileMode, ReconcileReport, Reconciler};
pub use remote::{HttpRemote, MemoryRemote, RemoteClient};
pub use snapshot::{StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{EntityStore, QueryBuilder, SharedStore};
pub use workspace::{Workspace, WorkspaceReport};

/// Type aliases for clarity
pub type LocalId = uuid::Uuid;
pub type RemoteId = i64;
pub type Revision = u64;
/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

pub(crate) fn now() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
